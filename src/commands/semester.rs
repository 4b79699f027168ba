use async_trait::async_trait;

use super::{Command, CommandContext, CommandError, Invocation};

pub struct StartSemester;

#[async_trait]
impl Command for StartSemester {
    fn name(&self) -> &'static str {
        "start_semester"
    }

    fn description(&self) -> &'static str {
        "create group roles, channels and the role message"
    }

    fn usage(&self) -> &'static str {
        "<number of groups>"
    }

    async fn execute(&self, ctx: &CommandContext, invocation: &Invocation) -> Result<String, CommandError> {
        let count = invocation
            .arg(0)
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .ok_or_else(|| self.usage_error())?;
        let done = ctx
            .service
            .provision(invocation.guild, count)
            .await
            .map_err(|e| CommandError::Failed(format!("could not start semester: {e}")))?;
        let mut reply = format!(
            "Semester started with {} group(s). Members pick a group in #{}:",
            done.groups.len(),
            ctx.service.settings().landing_channel
        );
        for g in &done.groups {
            reply.push('\n');
            reply.push_str(&g.label());
        }
        Ok(reply)
    }
}

pub struct EndSemester;

#[async_trait]
impl Command for EndSemester {
    fn name(&self) -> &'static str {
        "end_semester"
    }

    fn description(&self) -> &'static str {
        "move members to alumni and remove or archive group resources"
    }

    async fn execute(&self, ctx: &CommandContext, invocation: &Invocation) -> Result<String, CommandError> {
        let done = ctx
            .service
            .decommission(invocation.guild)
            .await
            .map_err(|e| CommandError::Failed(format!("could not end semester: {e}")))?;
        Ok(done.summary())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::platform::{Platform, PlatformError};
    use crate::semester::testing::{GUILD, fixture};
    use crate::store::GuildStore;

    #[tokio::test]
    async fn start_then_end() {
        let f = fixture();
        let ctx = CommandContext { service: Arc::new(f.service), canvas: None };

        let reply = StartSemester
            .execute(&ctx, &Invocation::new(GUILD, vec!["2".into()]))
            .await
            .unwrap();
        assert!(reply.starts_with("Semester started with 2 group(s)"));
        assert!(reply.contains("-> group_2"));
        assert!(f.store.get(GUILD).await.unwrap().unwrap().is_active());

        let reply = EndSemester.execute(&ctx, &Invocation::new(GUILD, vec![])).await.unwrap();
        assert!(reply.starts_with("Semester ended: 2 group(s)"));
        assert!(!f.store.get(GUILD).await.unwrap().unwrap().is_active());
        assert!(f.platform.roles(GUILD).await.unwrap().iter().all(|r| !r.name.starts_with("group_")));
    }

    #[tokio::test]
    async fn missing_or_bad_count_is_a_usage_error() {
        let ctx = CommandContext { service: Arc::new(fixture().service), canvas: None };
        for args in [vec![], vec!["two".to_string()], vec!["-1".to_string()]] {
            let err = StartSemester.execute(&ctx, &Invocation::new(GUILD, args)).await.unwrap_err();
            assert_eq!(err, CommandError::Usage("start_semester <number of groups>".into()));
        }
    }

    #[tokio::test]
    async fn engine_failures_are_reported() {
        let f = fixture();
        f.platform.fail_next("create_role", PlatformError::Forbidden("missing MANAGE_ROLES".into()));
        let ctx = CommandContext { service: Arc::new(f.service), canvas: None };
        let err = StartSemester
            .execute(&ctx, &Invocation::new(GUILD, vec!["3".into()]))
            .await
            .unwrap_err();
        let CommandError::Failed(msg) = err else { panic!("expected Failed, got {err:?}") };
        assert!(msg.contains("create_role"));

        let err = StartSemester
            .execute(&ctx, &Invocation::new(GUILD, vec!["26".into()]))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Failed(m) if m.contains("between 1 and 25")));
    }
}
