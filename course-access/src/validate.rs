use std::collections::HashSet;

use schema::Course;

use crate::error::Error;

/// Validate a course document before it is persisted:
/// - `title` is not empty
/// - lesson `order` values are unique within each module
/// - lesson ids are unique across the whole course
/// - every worksheet has non-empty instructions
///
/// Duplicate `order` values would make the unlock sequence depend on the
/// id tie-break alone, so they are rejected at write time.
pub fn validate_course(course: &Course) -> Result<(), Error> {
    if course.title.trim().is_empty() {
        return Err(Error::InvalidCourse("Course title is empty".into()));
    }

    let mut lesson_ids = HashSet::new();
    for module in &course.modules {
        let mut orders = HashSet::new();
        for lesson in &module.lessons {
            if !orders.insert(lesson.order) {
                return Err(Error::InvalidCourse(format!(
                    "Module {:?} has duplicate lesson order {}",
                    module.id, lesson.order
                )));
            }
            if !lesson_ids.insert(lesson.id) {
                return Err(Error::InvalidCourse(format!(
                    "Lesson {:?} appears more than once in course {:?}",
                    lesson.id, course.id
                )));
            }
            if let Some(worksheet) = &lesson.worksheet {
                if worksheet.instructions.trim().is_empty() {
                    return Err(Error::InvalidCourse(format!(
                        "Worksheet {:?} in lesson {:?} has empty instructions",
                        worksheet.id, lesson.id
                    )));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{DateTime, oid::ObjectId};
    use schema::{CourseLevel, CourseVisibility, Lesson, Module, Worksheet};

    fn lesson(order: i64) -> Lesson {
        Lesson {
            id: ObjectId::new(),
            title: format!("Lesson {order}"),
            order,
            video_url: String::new(),
            duration: String::new(),
            text_notes: String::new(),
            attachments: vec![],
            worksheet: None,
        }
    }

    fn course(lessons: Vec<Lesson>) -> Course {
        Course {
            id: ObjectId::new(),
            title: "VRT Fundamentals".to_string(),
            subtitle: String::new(),
            description: String::new(),
            category: "Therapy".to_string(),
            level: CourseLevel::Beginner,
            visibility: CourseVisibility::Private,
            modules: vec![Module {
                id: ObjectId::new(),
                title: "Module 1".to_string(),
                order: 1,
                lessons,
            }],
            created_at: DateTime::now(),
        }
    }

    #[test]
    fn accepts_well_formed_course() {
        let course = course(vec![lesson(1), lesson(2)]);
        assert!(validate_course(&course).is_ok());
    }

    #[test]
    fn rejects_empty_title() {
        let mut course = course(vec![lesson(1)]);
        course.title = "  ".to_string();
        assert!(validate_course(&course).is_err());
    }

    #[test]
    fn rejects_duplicate_order_within_module() {
        let course = course(vec![lesson(1), lesson(1)]);
        assert!(validate_course(&course).is_err());
    }

    #[test]
    fn allows_same_order_in_different_modules() {
        let mut course = course(vec![lesson(1)]);
        course.modules.push(Module {
            id: ObjectId::new(),
            title: "Module 2".to_string(),
            order: 2,
            lessons: vec![lesson(1)],
        });
        assert!(validate_course(&course).is_ok());
    }

    #[test]
    fn rejects_duplicate_lesson_id_across_modules() {
        let shared = lesson(1);
        let mut duplicate = shared.clone();
        duplicate.order = 1;
        let mut course = course(vec![shared]);
        course.modules.push(Module {
            id: ObjectId::new(),
            title: "Module 2".to_string(),
            order: 2,
            lessons: vec![duplicate],
        });
        assert!(validate_course(&course).is_err());
    }

    #[test]
    fn rejects_worksheet_without_instructions() {
        let mut bad = lesson(1);
        bad.worksheet = Some(Worksheet {
            id: ObjectId::new(),
            title: "Plan".to_string(),
            instructions: String::new(),
            template_url: None,
        });
        let course = course(vec![bad]);
        assert!(validate_course(&course).is_err());
    }
}
