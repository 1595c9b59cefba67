use std::sync::Arc;

use anyhow::Context;
use bson::{DateTime, oid::ObjectId};
use course_access::validate::validate_course;
use schema::{
    Announcement, Cohort, Course, Enrollment, Progress, Submission, SubmissionStatus, User,
};
use tracing::debug;

use crate::store::Store;

/// In-memory state consumed by the pure access checks. Loaded once and
/// held by the caller; mutated only by swapping in records returned from
/// the engine after a remote write succeeds.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub users: Vec<User>,
    pub courses: Vec<Course>,
    pub progress: Vec<Progress>,
    pub enrollments: Vec<Enrollment>,
    pub cohorts: Vec<Cohort>,
    pub submissions: Vec<Submission>,
    pub announcements: Vec<Announcement>,
}

/// Result of a worksheet submission: the appended submission record plus
/// the updated progress record, `None` when the lesson was already marked
/// submitted.
#[derive(Clone, Debug)]
pub struct WorksheetReceipt {
    pub submission: Submission,
    pub progress: Option<Progress>,
}

/// Service object over the persistence collaborator. All gating decisions
/// live in `course_access`; this type owns the side-effecting operations
/// and leaves the caller's snapshot untouched when a write fails.
pub struct LmsEngine {
    store: Arc<dyn Store>,
}

impl LmsEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Fetches all collections concurrently into a fresh snapshot.
    #[tracing::instrument(skip_all, err(Debug))]
    pub async fn snapshot(&self) -> anyhow::Result<Snapshot> {
        let (users, courses, progress, enrollments, cohorts, submissions, announcements) = tokio::try_join!(
            self.store.fetch_users(),
            self.store.fetch_courses(),
            self.store.fetch_progress(),
            self.store.fetch_enrollments(),
            self.store.fetch_cohorts(),
            self.store.fetch_submissions(),
            self.store.fetch_announcements(),
        )?;
        Ok(Snapshot {
            users,
            courses,
            progress,
            enrollments,
            cohorts,
            submissions,
            announcements,
        })
    }

    /// Idempotently records a lesson as completed, creating the progress
    /// record on first use. Returns the updated record for the caller's
    /// cache, or `Ok(None)` when the lesson was already recorded (in which
    /// case nothing is written).
    #[tracing::instrument(skip_all, err(Debug))]
    pub async fn mark_lesson_complete(
        &self,
        user_id: ObjectId,
        course_id: ObjectId,
        lesson_id: ObjectId,
        progress: &[Progress],
    ) -> anyhow::Result<Option<Progress>> {
        let existing = progress
            .iter()
            .find(|p| p.user_id == user_id && p.course_id == course_id);

        if let Some(record) = existing {
            if record.completed_lessons.contains(&lesson_id) {
                debug!(lesson = %lesson_id, "lesson already completed");
                return Ok(None);
            }
        }

        let mut record = existing.cloned().unwrap_or_else(|| Progress {
            id: ObjectId::new(),
            user_id,
            course_id,
            completed_lessons: vec![],
            submitted_worksheets: vec![],
        });
        record.completed_lessons.push(lesson_id);

        self.store
            .save_progress(&record)
            .await
            .context("unable to persist lesson completion")?;
        Ok(Some(record))
    }

    /// Appends an immutable submission record, then idempotently records
    /// the lesson in `submittedWorksheets`. The two writes form one
    /// logical unit even though the backend persists them separately.
    #[tracing::instrument(skip_all, err(Debug))]
    pub async fn submit_worksheet(
        &self,
        user_id: ObjectId,
        course_id: ObjectId,
        lesson_id: ObjectId,
        text_answer: String,
        progress: &[Progress],
    ) -> anyhow::Result<WorksheetReceipt> {
        let submission = Submission {
            id: ObjectId::new(),
            user_id,
            course_id,
            lesson_id,
            text_answer,
            status: SubmissionStatus::Submitted,
            created_at: DateTime::now(),
        };
        self.store
            .insert_submission(&submission)
            .await
            .context("unable to persist submission")?;

        let existing = progress
            .iter()
            .find(|p| p.user_id == user_id && p.course_id == course_id);

        let updated = match existing {
            Some(record) if record.submitted_worksheets.contains(&lesson_id) => {
                debug!(lesson = %lesson_id, "worksheet already recorded as submitted");
                None
            }
            _ => {
                let mut record = existing.cloned().unwrap_or_else(|| Progress {
                    id: ObjectId::new(),
                    user_id,
                    course_id,
                    completed_lessons: vec![],
                    submitted_worksheets: vec![],
                });
                record.submitted_worksheets.push(lesson_id);
                self.store
                    .save_progress(&record)
                    .await
                    .context("unable to persist worksheet progress")?;
                Some(record)
            }
        };

        Ok(WorksheetReceipt {
            submission,
            progress: updated,
        })
    }

    /// Grants `duration_days` of access under a cohort. Authorization is
    /// enforced by the backend; existing enrollments for the same
    /// (user, course) are left in place.
    #[tracing::instrument(skip_all, err(Debug))]
    pub async fn enroll_user(
        &self,
        user_id: ObjectId,
        course_id: ObjectId,
        cohort_id: ObjectId,
        duration_days: i64,
    ) -> anyhow::Result<Enrollment> {
        let now = DateTime::now();
        let expires_at = course_access::access::enrollment_window(now, duration_days)?;
        let enrollment = Enrollment {
            id: ObjectId::new(),
            user_id,
            course_id,
            cohort_id,
            enrolled_at: now,
            expires_at,
        };
        self.store
            .insert_enrollment(&enrollment)
            .await
            .context("unable to persist enrollment")?;
        debug!(enrollment = %enrollment.id, expires = %expires_at, "enrollment created");
        Ok(enrollment)
    }

    /// Deletes an enrollment. When it was the user's last enrollment for
    /// the course, the course is also cleared from the user's legacy
    /// `enrolledCourses` list; the updated user is returned for the
    /// caller's cache.
    #[tracing::instrument(skip_all, err(Debug))]
    pub async fn revoke_enrollment(
        &self,
        enrollment_id: ObjectId,
        users: &[User],
        enrollments: &[Enrollment],
    ) -> anyhow::Result<Option<User>> {
        let removed = enrollments.iter().find(|e| e.id == enrollment_id);

        self.store
            .delete_enrollment(enrollment_id)
            .await
            .context("unable to delete enrollment")?;

        let Some(removed) = removed else {
            return Ok(None);
        };

        let still_enrolled = enrollments.iter().any(|e| {
            e.id != enrollment_id && e.user_id == removed.user_id && e.course_id == removed.course_id
        });
        if still_enrolled {
            return Ok(None);
        }

        let Some(user) = users.iter().find(|u| u.id == removed.user_id) else {
            return Ok(None);
        };
        if !user.enrolled_courses.contains(&removed.course_id) {
            return Ok(None);
        }

        let mut updated = user.clone();
        updated.enrolled_courses.retain(|c| *c != removed.course_id);
        self.store
            .save_user(&updated)
            .await
            .context("unable to update user enrolled course list")?;
        Ok(Some(updated))
    }

    // CRUD passthroughs. Pure plumbing between the presentation layer and
    // the store; no gating logic.

    #[tracing::instrument(skip_all, err(Debug))]
    pub async fn save_course(&self, course: &Course) -> anyhow::Result<()> {
        validate_course(course)?;
        self.store.save_course(course).await
    }

    #[tracing::instrument(skip_all, err(Debug))]
    pub async fn delete_user(&self, user_id: ObjectId) -> anyhow::Result<()> {
        self.store.delete_enrollments_by_user(user_id).await?;
        self.store.delete_user(user_id).await
    }

    #[tracing::instrument(skip_all, err(Debug))]
    pub async fn add_cohort(
        &self,
        course_id: ObjectId,
        name: String,
        year: i64,
    ) -> anyhow::Result<Cohort> {
        let cohort = Cohort {
            id: ObjectId::new(),
            course_id,
            name,
            year,
            created_at: DateTime::now(),
        };
        self.store.insert_cohort(&cohort).await?;
        Ok(cohort)
    }

    /// Deleting a cohort also revokes every enrollment under it.
    #[tracing::instrument(skip_all, err(Debug))]
    pub async fn delete_cohort(&self, cohort_id: ObjectId) -> anyhow::Result<()> {
        self.store.delete_enrollments_by_cohort(cohort_id).await?;
        self.store.delete_cohort(cohort_id).await
    }

    #[tracing::instrument(skip_all, err(Debug))]
    pub async fn add_announcement(
        &self,
        title: String,
        body: String,
        course_id: Option<ObjectId>,
    ) -> anyhow::Result<Announcement> {
        let announcement = Announcement {
            id: ObjectId::new(),
            course_id,
            title,
            body,
            created_at: DateTime::now(),
        };
        self.store.insert_announcement(&announcement).await?;
        Ok(announcement)
    }

    #[tracing::instrument(skip_all, err(Debug))]
    pub async fn delete_announcement(&self, id: ObjectId) -> anyhow::Result<()> {
        self.store.delete_announcement(id).await
    }
}
