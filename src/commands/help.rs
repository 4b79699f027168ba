use async_trait::async_trait;

use super::{Command, CommandContext, CommandError, CommandSummary, Invocation};

/// Lists the registered commands.  Built with the summaries of its siblings
/// since commands do not see the registry.
pub struct Help {
    summaries: Vec<CommandSummary>,
}

impl Help {
    pub fn new(summaries: Vec<CommandSummary>) -> Self {
        Self { summaries }
    }
}

#[async_trait]
impl Command for Help {
    fn name(&self) -> &'static str {
        "help"
    }

    fn description(&self) -> &'static str {
        "show this list"
    }

    async fn execute(&self, _ctx: &CommandContext, _invocation: &Invocation) -> Result<String, CommandError> {
        let lines: Vec<String> = self
            .summaries
            .iter()
            .map(|s| {
                let synopsis = format!("/{} {}", s.name, s.usage);
                format!("{:<34} {}", synopsis.trim_end(), s.description)
            })
            .collect();
        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::CommandRegistry;
    use super::*;
    use crate::semester::testing::{GUILD, fixture};

    #[tokio::test]
    async fn help_lists_every_builtin() {
        let reg = CommandRegistry::builtin();
        let ctx = CommandContext { service: Arc::new(fixture().service), canvas: None };
        let out = reg.execute(&ctx, "help", &Invocation::new(GUILD, vec![])).await.unwrap();
        for name in reg.names() {
            assert!(out.contains(&format!("/{name}")), "help is missing {name}");
        }
        assert!(out.contains("/start_semester <number of groups>"));
    }
}
