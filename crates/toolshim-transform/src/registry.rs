use toolshim_protocol::ToolDefinition;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredTool {
    pub name: String,
    /// Key of the single-argument object built for this tool.
    pub argument: String,
}

/// Function tools declared by the client for one request cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    /// Tools without declared parameters use `fallback_argument`.
    pub fn from_definitions(definitions: &[ToolDefinition], fallback_argument: &str) -> Self {
        let mut tools: Vec<RegisteredTool> = Vec::new();
        for definition in definitions {
            let Some(name) = definition.function_name() else {
                continue;
            };
            if tools.iter().any(|tool| tool.name == name) {
                continue;
            }
            tools.push(RegisteredTool {
                name: name.to_string(),
                argument: definition
                    .first_parameter()
                    .unwrap_or(fallback_argument)
                    .to_string(),
            });
        }
        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|tool| tool.name.as_str())
    }
}
