//! Canvas LMS course lookup.
//!
//! Only two questions are ever asked of Canvas: "what is course N" and
//! "which courses are recent enough to offer as suggestions".  Recent means
//! created in the current or the previous calendar year.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::CourseError;
use crate::model::CanvasCourse;

const PAGE_SIZE: usize = 100;
/// Upper bound on pages fetched for suggestions.
const MAX_PAGES: usize = 20;

#[async_trait]
pub trait CourseDirectory: Send + Sync {
    async fn course(&self, id: u64) -> Result<CanvasCourse, CourseError>;

    /// Courses created since the start of last calendar year.
    async fn recent_courses(&self) -> Result<Vec<CanvasCourse>, CourseError>;
}

#[derive(Debug, Deserialize)]
struct WireCourse {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

impl WireCourse {
    fn created_year(&self) -> Option<i32> {
        let raw = self.created_at.as_deref()?;
        DateTime::parse_from_rfc3339(raw).ok().map(|at| at.with_timezone(&Utc).year())
    }

    fn into_course(self) -> CanvasCourse {
        CanvasCourse {
            name: self.name.unwrap_or_else(|| format!("course {}", self.id)),
            id: self.id,
        }
    }
}

fn recent(courses: Vec<WireCourse>, this_year: i32) -> Vec<CanvasCourse> {
    courses
        .into_iter()
        .filter(|c| c.created_year().is_some_and(|year| year >= this_year - 1))
        .map(WireCourse::into_course)
        .collect()
}

/// Canvas REST client (`/api/v1`), authenticated with a bearer token.
#[derive(Debug, Clone)]
pub struct CanvasClient {
    client: Client,
    base_url: String,
    token: String,
}

impl CanvasClient {
    pub fn new(base_url: &str, token: String, timeout: Duration) -> Result<Self, CourseError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CourseError::Canvas(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str, query: &[(&str, String)]) -> Result<T, CourseError> {
        let url = format!("{}/api/v1/{path}", self.base_url);
        debug!(%url, "canvas request");
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(|e| CourseError::Canvas(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CourseError::Canvas(format!("HTTP {status}: {body}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| CourseError::Canvas(format!("unexpected response: {e}")))
    }
}

#[async_trait]
impl CourseDirectory for CanvasClient {
    async fn course(&self, id: u64) -> Result<CanvasCourse, CourseError> {
        let course: WireCourse = self.get(&format!("courses/{id}"), &[]).await?;
        Ok(course.into_course())
    }

    async fn recent_courses(&self) -> Result<Vec<CanvasCourse>, CourseError> {
        let mut all = Vec::new();
        for page in 1..=MAX_PAGES {
            let batch: Vec<WireCourse> = self
                .get(
                    "courses",
                    &[("per_page", PAGE_SIZE.to_string()), ("page", page.to_string())],
                )
                .await?;
            let done = batch.len() < PAGE_SIZE;
            all.extend(batch);
            if done {
                break;
            }
        }
        Ok(recent(all, Utc::now().year()))
    }
}

/// Fixed course list.  Stands in for Canvas when it is not configured
/// and in tests.
#[derive(Debug, Clone, Default)]
pub struct FixedDirectory {
    courses: Vec<CanvasCourse>,
}

impl FixedDirectory {
    pub fn new(courses: Vec<CanvasCourse>) -> Self {
        Self { courses }
    }
}

#[async_trait]
impl CourseDirectory for FixedDirectory {
    async fn course(&self, id: u64) -> Result<CanvasCourse, CourseError> {
        self.courses
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| CourseError::Canvas(format!("no course with id {id}")))
    }

    async fn recent_courses(&self) -> Result<Vec<CanvasCourse>, CourseError> {
        Ok(self.courses.clone())
    }
}
