use toolshim_common::default_utterance_filters;
use toolshim_protocol::{ContentPart, MessageContent};

use super::*;

fn locator() -> UtteranceLocator {
    let filter = UtteranceFilter::from_config(&default_utterance_filters()).unwrap();
    UtteranceLocator::new("Conversation info", filter).unwrap()
}

#[test]
fn newest_user_turn_wins() {
    let messages = vec![
        Message::user("first"),
        Message::assistant("ok"),
        Message::user("  stats  "),
    ];
    let found = locator().locate(&messages).unwrap();
    assert_eq!(found.text, "  stats  ");
    assert_eq!(found.chat_id, None);
}

#[test]
fn synthetic_turns_are_skipped() {
    let messages = vec![
        Message::user("next"),
        Message::user("System: heartbeat"),
        Message::user("A cron job finished"),
        Message::user("NO_REPLY"),
    ];
    assert_eq!(locator().locate(&messages).unwrap().text, "next");
}

#[test]
fn cron_marker_only_counts_near_the_start() {
    let late = format!("{}Cron: nightly", "x".repeat(250));
    let messages = vec![Message::user("early"), Message::user(late.clone())];
    assert_eq!(locator().locate(&messages).unwrap().text, late);

    let messages = vec![Message::user("early"), Message::user("hey Cron: nightly")];
    assert_eq!(locator().locate(&messages).unwrap().text, "early");
}

#[test]
fn metadata_envelope_is_unwrapped() {
    let envelope = "Conversation info (untrusted metadata):\n```json\n{\"sender\": \"Ana id:123456789\"}\n```\n\nscout @rustlang";
    let found = locator().locate(&[Message::user(envelope)]).unwrap();
    assert_eq!(found.text, "scout @rustlang");
    assert_eq!(found.chat_id.as_deref(), Some("123456789"));
}

#[test]
fn envelope_without_utterance_is_skipped() {
    let envelope = "Conversation info (untrusted metadata):\n```json\n{\"chat\": \"telegram:5551234\"}\n```";
    let messages = vec![Message::user("stats"), Message::user(envelope)];
    let found = locator().locate(&messages).unwrap();
    assert_eq!(found.text, "stats");
    assert_eq!(found.chat_id.as_deref(), Some("5551234"));
}

#[test]
fn first_text_part_is_used() {
    let message = Message {
        content: Some(MessageContent::Parts(vec![
            ContentPart {
                kind: "image_url".to_string(),
                text: None,
                extra: Default::default(),
            },
            ContentPart::text("skills"),
        ])),
        ..Message::user("")
    };
    assert_eq!(locator().locate(&[message]).unwrap().text, "skills");
}

#[test]
fn custom_predicates_extend_the_filter() {
    let filter = UtteranceFilter::default().with(Prefix("HEARTBEAT".to_string()));
    let locator = UtteranceLocator::new("Conversation info", filter).unwrap();
    let messages = vec![Message::user("real"), Message::user("HEARTBEAT check")];
    assert_eq!(locator.locate(&messages).unwrap().text, "real");
}

#[test]
fn blank_newest_turn_yields_nothing() {
    let messages = vec![Message::user("stats"), Message::user("   ")];
    assert!(locator().locate(&messages).is_none());
}
