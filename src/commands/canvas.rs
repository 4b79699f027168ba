use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::{Choice, Command, CommandContext, CommandError, Invocation};
use crate::canvas::CourseDirectory;
use crate::model::GuildId;
use crate::store::StoreError;

fn directory(ctx: &CommandContext) -> Result<&Arc<dyn CourseDirectory>, CommandError> {
    ctx.canvas
        .as_ref()
        .ok_or_else(|| CommandError::Failed("Canvas is not configured".into()))
}

pub struct CanvasAddCourse;

#[async_trait]
impl Command for CanvasAddCourse {
    fn name(&self) -> &'static str {
        "canvas_add_course"
    }

    fn description(&self) -> &'static str {
        "track a Canvas course for this server"
    }

    fn usage(&self) -> &'static str {
        "<course id>"
    }

    async fn execute(&self, ctx: &CommandContext, invocation: &Invocation) -> Result<String, CommandError> {
        let id = invocation
            .arg(0)
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .ok_or_else(|| self.usage_error())?;
        let course = directory(ctx)?
            .course(id)
            .await
            .map_err(|e| CommandError::Failed(e.to_string()))?;
        let name = course.name.clone();
        match ctx.service.repository().add_canvas_course(invocation.guild, course).await {
            Ok(true) => Ok(format!("Now tracking {name} ({id})")),
            Ok(false) => Ok(format!("{name} ({id}) is already tracked")),
            Err(StoreError::Missing(_)) => Err(CommandError::Failed("this server is not registered".into())),
            Err(e) => Err(CommandError::Failed(format!("could not save course: {e}"))),
        }
    }

    async fn autocomplete(&self, ctx: &CommandContext, guild: GuildId, partial: &str) -> Vec<Choice> {
        let Ok(dir) = directory(ctx) else {
            return Vec::new();
        };
        let courses = match dir.recent_courses().await {
            Ok(c) => c,
            Err(e) => {
                warn!(%guild, error = %e, "canvas suggestions unavailable");
                return Vec::new();
            }
        };
        let needle = partial.trim().to_lowercase();
        courses
            .into_iter()
            .filter(|c| {
                needle.is_empty() || c.name.to_lowercase().contains(&needle) || c.id.to_string().starts_with(&needle)
            })
            .map(|c| Choice { name: c.name, value: c.id.to_string() })
            .collect()
    }
}

pub struct CanvasCourses;

#[async_trait]
impl Command for CanvasCourses {
    fn name(&self) -> &'static str {
        "canvas_courses"
    }

    fn description(&self) -> &'static str {
        "list tracked Canvas courses"
    }

    async fn execute(&self, ctx: &CommandContext, invocation: &Invocation) -> Result<String, CommandError> {
        let record = ctx
            .service
            .repository()
            .load(invocation.guild)
            .await
            .map_err(|e| CommandError::Failed(e.to_string()))?;
        let courses = record.map(|g| g.canvas_courses).unwrap_or_default();
        if courses.is_empty() {
            return Ok("No Canvas courses tracked".into());
        }
        let lines: Vec<String> = courses.iter().map(|c| format!("{} ({})", c.name, c.id)).collect();
        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::FixedDirectory;
    use crate::model::CanvasCourse;
    use crate::semester::testing::{GUILD, fixture};

    fn ctx() -> CommandContext {
        let dir = FixedDirectory::new(vec![
            CanvasCourse { name: "INF-1100 Introduction to programming".into(), id: 2001 },
            CanvasCourse { name: "INF-2200 Computer architecture".into(), id: 2002 },
        ]);
        CommandContext { service: Arc::new(fixture().service), canvas: Some(Arc::new(dir)) }
    }

    #[tokio::test]
    async fn add_course_dedupes() {
        let ctx = ctx();
        let inv = Invocation::new(GUILD, vec!["2001".into()]);
        let first = CanvasAddCourse.execute(&ctx, &inv).await.unwrap();
        assert!(first.starts_with("Now tracking"));
        let second = CanvasAddCourse.execute(&ctx, &inv).await.unwrap();
        assert!(second.ends_with("already tracked"));

        let list = CanvasCourses.execute(&ctx, &Invocation::new(GUILD, vec![])).await.unwrap();
        assert_eq!(list, "INF-1100 Introduction to programming (2001)");
    }

    #[tokio::test]
    async fn unknown_course_and_unregistered_guild_fail() {
        let ctx = ctx();
        let err = CanvasAddCourse
            .execute(&ctx, &Invocation::new(GUILD, vec!["9".into()]))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Failed(_)));

        let err = CanvasAddCourse
            .execute(&ctx, &Invocation::new(GuildId(1), vec!["2001".into()]))
            .await
            .unwrap_err();
        assert_eq!(err, CommandError::Failed("this server is not registered".into()));
    }

    #[tokio::test]
    async fn autocomplete_filters_by_name_or_id() {
        let ctx = ctx();
        let by_name = CanvasAddCourse.autocomplete(&ctx, GUILD, "architecture").await;
        assert_eq!(by_name, vec![Choice { name: "INF-2200 Computer architecture".into(), value: "2002".into() }]);
        assert_eq!(CanvasAddCourse.autocomplete(&ctx, GUILD, "200").await.len(), 2);
        assert_eq!(CanvasAddCourse.autocomplete(&ctx, GUILD, "").await.len(), 2);
    }

    #[tokio::test]
    async fn without_canvas_commands_fail_and_suggest_nothing() {
        let ctx = CommandContext { service: Arc::new(fixture().service), canvas: None };
        let err = CanvasAddCourse
            .execute(&ctx, &Invocation::new(GUILD, vec!["1".into()]))
            .await
            .unwrap_err();
        assert_eq!(err, CommandError::Failed("Canvas is not configured".into()));
        assert!(CanvasAddCourse.autocomplete(&ctx, GUILD, "").await.is_empty());
        assert_eq!(
            CanvasCourses.execute(&ctx, &Invocation::new(GUILD, vec![])).await.unwrap(),
            "No Canvas courses tracked"
        );
    }
}
