use toolshim_protocol::Message;

/// Keeps every system/developer turn and the newest `window` conversation
/// turns, preserving relative order. Returns the number of dropped turns.
pub fn trim_history(messages: &mut Vec<Message>, window: usize) -> usize {
    let conversation = messages
        .iter()
        .filter(|message| !message.role.is_instruction())
        .count();
    if conversation <= window {
        return 0;
    }

    let mut to_drop = conversation - window;
    let dropped = to_drop;
    messages.retain(|message| {
        if message.role.is_instruction() || to_drop == 0 {
            return true;
        }
        to_drop -= 1;
        false
    });
    dropped
}
