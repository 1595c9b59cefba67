use mongodb::bson::{DateTime, oid::ObjectId};
use schema::{Course, Enrollment, Lesson, Progress, UserRole};
use std::time::Duration;
use tracing::trace;

use crate::error::Error;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Flattens a course's modules into a single lesson list, sorted by the
/// lesson `order` field ascending. Ties on `order` are broken by lesson id
/// ascending so the sequence is stable regardless of document layout.
pub fn ordered_lessons(course: &Course) -> Vec<&Lesson> {
    let mut lessons: Vec<&Lesson> = course
        .modules
        .iter()
        .flat_map(|m| m.lessons.iter())
        .collect();
    lessons.sort_by(|a, b| a.order.cmp(&b.order).then(a.id.cmp(&b.id)));
    lessons
}

pub fn is_lesson_completed(progress: Option<&Progress>, lesson_id: ObjectId) -> bool {
    progress.is_some_and(|p| p.completed_lessons.contains(&lesson_id))
}

pub fn is_worksheet_submitted(progress: Option<&Progress>, lesson_id: ObjectId) -> bool {
    progress.is_some_and(|p| p.submitted_worksheets.contains(&lesson_id))
}

/// Strict sequential unlock: a lesson is open once the previous lesson in
/// the ordered sequence is completed and, if that lesson carries a
/// worksheet, its worksheet is submitted. The first lesson is always open.
/// Admins bypass locking entirely. A lesson id not present in the course
/// is treated as locked.
pub fn is_lesson_locked(
    course: &Course,
    lesson_id: ObjectId,
    role: UserRole,
    progress: Option<&Progress>,
) -> bool {
    match role {
        UserRole::Admin => return false,
        UserRole::Student | UserRole::Coach => {}
    }

    let lessons = ordered_lessons(course);
    let Some(index) = lessons.iter().position(|l| l.id == lesson_id) else {
        trace!(lesson = %lesson_id, course = %course.id, "lesson not in course");
        return true;
    };
    if index == 0 {
        return false;
    }

    let prev = lessons[index - 1];
    let prev_completed = is_lesson_completed(progress, prev.id);
    let prev_worksheet_done =
        prev.worksheet.is_none() || is_worksheet_submitted(progress, prev.id);

    !(prev_completed && prev_worksheet_done)
}

/// A course is completed once every lesson is in `completed_lessons` and
/// every lesson owning a worksheet is in `submitted_worksheets`. A course
/// with zero lessons is never completed.
pub fn is_course_completed(course: &Course, progress: Option<&Progress>) -> bool {
    let lessons = ordered_lessons(course);
    if lessons.is_empty() {
        return false;
    }
    let Some(progress) = progress else {
        return false;
    };

    let lessons_done = lessons
        .iter()
        .all(|l| progress.completed_lessons.contains(&l.id));
    let worksheets_done = lessons
        .iter()
        .filter(|l| l.worksheet.is_some())
        .all(|l| progress.submitted_worksheets.contains(&l.id));

    lessons_done && worksheets_done
}

/// Picks the enrollment that governs access checks for (user, course).
/// Multiple rows may coexist; the most recently created one wins
/// (latest `enrolled_at`, ties broken by id).
pub fn governing_enrollment(
    enrollments: &[Enrollment],
    user_id: ObjectId,
    course_id: ObjectId,
) -> Option<&Enrollment> {
    enrollments
        .iter()
        .filter(|e| e.user_id == user_id && e.course_id == course_id)
        .max_by_key(|e| (e.enrolled_at, e.id))
}

/// Admins are never expired. A user without any enrollment for the course
/// is expired (fail closed). Otherwise access is expired strictly after
/// `expires_at` passes.
pub fn is_access_expired(
    enrollments: &[Enrollment],
    user_id: ObjectId,
    course_id: ObjectId,
    role: UserRole,
    now: DateTime,
) -> bool {
    match role {
        UserRole::Admin => return false,
        UserRole::Student | UserRole::Coach => {}
    }

    match governing_enrollment(enrollments, user_id, course_id) {
        Some(enrollment) => now.timestamp_millis() > enrollment.expires_at.timestamp_millis(),
        None => true,
    }
}

/// Whole days remaining until the governing enrollment expires, rounded
/// up, never negative. Returns 0 when no enrollment exists.
pub fn days_remaining(
    enrollments: &[Enrollment],
    user_id: ObjectId,
    course_id: ObjectId,
    now: DateTime,
) -> i64 {
    let Some(enrollment) = governing_enrollment(enrollments, user_id, course_id) else {
        return 0;
    };

    let diff = enrollment.expires_at.timestamp_millis() - now.timestamp_millis();
    if diff <= 0 {
        return 0;
    }
    (diff + MS_PER_DAY - 1) / MS_PER_DAY
}

/// Computes the expiry timestamp for a new enrollment:
/// `expires_at = now + duration_days * 86_400 s`.
pub fn enrollment_window(now: DateTime, duration_days: i64) -> Result<DateTime, Error> {
    if duration_days <= 0 {
        return Err(Error::InvalidEnrollment(format!(
            "enrollment duration must be a positive number of days, got {duration_days}"
        )));
    }
    Ok(now.saturating_add_duration(Duration::from_secs(duration_days as u64 * 86_400)))
}
