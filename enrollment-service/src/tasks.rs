use std::collections::{BTreeSet, HashMap};

use anyhow::Context;
use bson::{DateTime, oid::ObjectId};
use futures_util::TryStreamExt;
use mongodb::{Namespace, bson::doc};
use schema::{Enrollment, User, db};
use serde::Deserialize;

use crate::config::EnvVars;

/// Rebuilds each user's legacy `enrolledCourses` convenience list from the
/// authoritative enrollment collection. The app patches the list inline on
/// enroll/revoke; this repairs any drift between the two.
#[tracing::instrument(skip_all, err(Debug))]
pub async fn reconcile_enrolled_courses(env_vars: &EnvVars) -> anyhow::Result<()> {
    let client = db::client(&env_vars.mongodb_uri).await?;

    let user_collection = db::get_collection::<User>(&client, "user").await;
    let enrollment_collection = db::get_collection::<Enrollment>(&client, "enrollment").await;

    #[derive(Deserialize)]
    struct EnrollmentProjection {
        #[serde(rename = "userId")]
        user_id: ObjectId,
        #[serde(rename = "courseId")]
        course_id: ObjectId,
    }
    let enrollments: Vec<EnrollmentProjection> = enrollment_collection
        .clone_with_type::<EnrollmentProjection>()
        .find(doc! {})
        .projection(doc! {"userId": true, "courseId": true})
        .await
        .context("unable to query enrollment collection")?
        .try_collect()
        .await
        .context("unable to deserialize enrollment projections")?;

    let mut courses_by_user: HashMap<ObjectId, BTreeSet<ObjectId>> = HashMap::new();
    for enrollment in enrollments {
        courses_by_user
            .entry(enrollment.user_id)
            .or_default()
            .insert(enrollment.course_id);
    }

    let users: Vec<User> = user_collection
        .find(doc! {})
        .await
        .context("unable to query user collection")?
        .try_collect()
        .await
        .context("unable to deserialize user records")?;

    let database = client
        .default_database()
        .context("database needs to be defined in the URI")?;
    let namespace = Namespace::new(database.name(), "user");

    let mut updates = vec![];
    for user in users {
        let expected = courses_by_user.remove(&user.id).unwrap_or_default();
        let current: BTreeSet<ObjectId> = user.enrolled_courses.iter().copied().collect();
        if current == expected {
            continue;
        }

        tracing::debug!(
            user = %user.id,
            stale = current.len(),
            expected = expected.len(),
            "enrolled course list out of sync"
        );
        let course_ids: Vec<ObjectId> = expected.into_iter().collect();
        updates.push(
            mongodb::options::UpdateOneModel::builder()
                .namespace(namespace.clone())
                .filter(doc! {"_id": user.id})
                .update(doc! {"$set": {"enrolledCourses": course_ids}})
                .build(),
        );
    }

    if !updates.is_empty() {
        let res = user_collection
            .client()
            .bulk_write(updates)
            .await
            .context("unable to bulk-update user enrolled course lists")?;
        tracing::info!(num = res.modified_count, "reconciled enrolled course lists");
    } else {
        tracing::info!("all enrolled course lists already in sync");
    }

    Ok(())
}

/// Logs enrollments expiring within the configured warning window.
#[tracing::instrument(skip_all, err(Debug))]
pub async fn report_expiring_enrollments(env_vars: &EnvVars) -> anyhow::Result<()> {
    let client = db::client(&env_vars.mongodb_uri).await?;

    let enrollment_collection = db::get_collection::<Enrollment>(&client, "enrollment").await;

    let now = DateTime::now();
    let warn_until = now.saturating_add_duration(env_vars.expiry_warning_in_s);

    let expiring: Vec<Enrollment> = enrollment_collection
        .find(doc! {
            "expiresAt": {
                "$gt": now,
                "$lte": warn_until
            }
        })
        .await
        .context("unable to query enrollment collection")?
        .try_collect()
        .await
        .context("unable to deserialize enrollment records")?;

    for enrollment in expiring.iter() {
        tracing::info!(
            enrollment = %enrollment.id,
            user = %enrollment.user_id,
            course = %enrollment.course_id,
            expires = %enrollment.expires_at,
            "enrollment expiring soon"
        );
    }
    tracing::info!(
        num = expiring.len(),
        "enrollments expiring within warning window"
    );

    Ok(())
}
