//! Entity types for the LMS MongoDB collections.
//!
//! Field names are serialized in camelCase to match the stored documents.
//! The `enrollment` collection is the authoritative record of course
//! access; `User.enrolled_courses` is a legacy denormalized list kept in
//! sync by the enrollment service.

use mongodb::bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

pub mod db;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    Student,
    Coach,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Blocked,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub status: UserStatus,
    /// Course IDs for quick lookup. Not authoritative; see `Enrollment`.
    #[serde(default)]
    pub enrolled_courses: Vec<ObjectId>,
    pub avatar: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cohort {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub course_id: ObjectId,
    pub name: String,
    pub year: i64,
    pub created_at: DateTime,
}

/// Time-bounded access for one user to one course under one cohort.
/// Never mutated in place; created on grant, deleted on revoke.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: ObjectId,
    pub course_id: ObjectId,
    pub cohort_id: ObjectId,
    pub enrolled_at: DateTime,
    pub expires_at: DateTime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Pdf,
    Doc,
    Link,
    Image,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub url: String,
    pub kind: AttachmentKind,
    pub downloadable: bool,
}

/// Required free-text submission attached to a lesson. Gating of the next
/// lesson is keyed by the owning lesson's id, not the worksheet id.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worksheet {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    pub instructions: String,
    pub template_url: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    pub order: i64,
    pub video_url: String,
    pub duration: String,
    pub text_notes: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub worksheet: Option<Worksheet>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    pub order: i64,
    pub lessons: Vec<Lesson>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CourseLevel {
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseVisibility {
    Public,
    Private,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub category: String,
    pub level: CourseLevel,
    pub visibility: CourseVisibility,
    pub modules: Vec<Module>,
    pub created_at: DateTime,
}

/// One record per (user, course). Created lazily on the first completion
/// or worksheet submission. `completed_lessons` and `submitted_worksheets`
/// are sets of lesson ids; insertion order carries no meaning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: ObjectId,
    pub course_id: ObjectId,
    #[serde(default)]
    pub completed_lessons: Vec<ObjectId>,
    #[serde(default)]
    pub submitted_worksheets: Vec<ObjectId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Submitted,
    UnderReview,
    Approved,
    NeedsChanges,
}

/// Append-only worksheet answer. Multiple submissions may exist for the
/// same (user, lesson); only `Progress.submitted_worksheets` gates unlock.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: ObjectId,
    pub course_id: ObjectId,
    pub lesson_id: ObjectId,
    pub text_answer: String,
    pub status: SubmissionStatus,
    pub created_at: DateTime,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub course_id: Option<ObjectId>,
    pub title: String,
    pub body: String,
    pub created_at: DateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_and_status_serialize_to_stored_values() {
        assert_eq!(
            serde_json::to_string(&UserRole::Admin).unwrap(),
            "\"ADMIN\""
        );
        assert_eq!(
            serde_json::to_string(&UserStatus::Blocked).unwrap(),
            "\"blocked\""
        );
        assert_eq!(
            serde_json::to_string(&SubmissionStatus::UnderReview).unwrap(),
            "\"under_review\""
        );
    }

    #[test]
    fn progress_sets_default_to_empty() {
        let raw = serde_json::json!({
            "_id": ObjectId::new(),
            "userId": ObjectId::new(),
            "courseId": ObjectId::new(),
        });
        let progress: Progress = serde_json::from_value(raw).unwrap();
        assert!(progress.completed_lessons.is_empty());
        assert!(progress.submitted_worksheets.is_empty());
    }
}
