use anyhow::Context;
use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::{
    Client, Collection,
    bson::{doc, oid::ObjectId},
};
use schema::{Announcement, Cohort, Course, Enrollment, Progress, Submission, User, db};
use serde::{Serialize, de::DeserializeOwned};

/// Read/write collaborator for the persistence backend. The engine never
/// interprets backend failures; every operation either succeeds or
/// surfaces an opaque error to the caller.
#[async_trait]
pub trait Store: Send + Sync {
    async fn fetch_users(&self) -> anyhow::Result<Vec<User>>;
    async fn fetch_courses(&self) -> anyhow::Result<Vec<Course>>;
    async fn fetch_progress(&self) -> anyhow::Result<Vec<Progress>>;
    async fn fetch_enrollments(&self) -> anyhow::Result<Vec<Enrollment>>;
    async fn fetch_cohorts(&self) -> anyhow::Result<Vec<Cohort>>;
    async fn fetch_submissions(&self) -> anyhow::Result<Vec<Submission>>;
    async fn fetch_announcements(&self) -> anyhow::Result<Vec<Announcement>>;

    async fn save_user(&self, user: &User) -> anyhow::Result<()>;
    async fn delete_user(&self, id: ObjectId) -> anyhow::Result<()>;
    async fn save_course(&self, course: &Course) -> anyhow::Result<()>;
    /// Upsert keyed on (userId, courseId); one record per pair.
    async fn save_progress(&self, progress: &Progress) -> anyhow::Result<()>;
    async fn insert_submission(&self, submission: &Submission) -> anyhow::Result<()>;
    async fn insert_enrollment(&self, enrollment: &Enrollment) -> anyhow::Result<()>;
    async fn delete_enrollment(&self, id: ObjectId) -> anyhow::Result<()>;
    async fn delete_enrollments_by_cohort(&self, cohort_id: ObjectId) -> anyhow::Result<()>;
    async fn delete_enrollments_by_user(&self, user_id: ObjectId) -> anyhow::Result<()>;
    async fn insert_cohort(&self, cohort: &Cohort) -> anyhow::Result<()>;
    async fn delete_cohort(&self, id: ObjectId) -> anyhow::Result<()>;
    async fn insert_announcement(&self, announcement: &Announcement) -> anyhow::Result<()>;
    async fn delete_announcement(&self, id: ObjectId) -> anyhow::Result<()>;
}

pub struct MongoStore {
    client: Client,
}

impl MongoStore {
    pub async fn connect(uri: &str) -> anyhow::Result<Self> {
        let client = db::client(uri).await.context("unable to connect to MongoDB")?;
        Ok(Self { client })
    }

    async fn collection<T>(&self, name: &str) -> Collection<T>
    where
        T: Send + Sync + DeserializeOwned + Serialize,
    {
        db::get_collection::<T>(&self.client, name).await
    }

    async fn fetch_all<T>(&self, name: &str) -> anyhow::Result<Vec<T>>
    where
        T: Send + Sync + DeserializeOwned + Serialize,
    {
        let collection = self.collection::<T>(name).await;
        let records = collection
            .find(doc! {})
            .await
            .with_context(|| format!("unable to query {name} collection"))?
            .try_collect()
            .await
            .with_context(|| format!("unable to deserialize {name} records"))?;
        Ok(records)
    }
}

#[async_trait]
impl Store for MongoStore {
    async fn fetch_users(&self) -> anyhow::Result<Vec<User>> {
        self.fetch_all("user").await
    }

    async fn fetch_courses(&self) -> anyhow::Result<Vec<Course>> {
        self.fetch_all("course").await
    }

    async fn fetch_progress(&self) -> anyhow::Result<Vec<Progress>> {
        self.fetch_all("progress").await
    }

    async fn fetch_enrollments(&self) -> anyhow::Result<Vec<Enrollment>> {
        self.fetch_all("enrollment").await
    }

    async fn fetch_cohorts(&self) -> anyhow::Result<Vec<Cohort>> {
        self.fetch_all("cohort").await
    }

    async fn fetch_submissions(&self) -> anyhow::Result<Vec<Submission>> {
        self.fetch_all("submission").await
    }

    async fn fetch_announcements(&self) -> anyhow::Result<Vec<Announcement>> {
        self.fetch_all("announcement").await
    }

    async fn save_user(&self, user: &User) -> anyhow::Result<()> {
        self.collection::<User>("user")
            .await
            .replace_one(doc! {"_id": user.id}, user)
            .upsert(true)
            .await
            .context("unable to save user")?;
        Ok(())
    }

    async fn delete_user(&self, id: ObjectId) -> anyhow::Result<()> {
        self.collection::<User>("user")
            .await
            .delete_one(doc! {"_id": id})
            .await
            .context("unable to delete user")?;
        Ok(())
    }

    async fn save_course(&self, course: &Course) -> anyhow::Result<()> {
        self.collection::<Course>("course")
            .await
            .replace_one(doc! {"_id": course.id}, course)
            .upsert(true)
            .await
            .context("unable to save course")?;
        Ok(())
    }

    async fn save_progress(&self, progress: &Progress) -> anyhow::Result<()> {
        self.collection::<Progress>("progress")
            .await
            .replace_one(
                doc! {"userId": progress.user_id, "courseId": progress.course_id},
                progress,
            )
            .upsert(true)
            .await
            .context("unable to save progress record")?;
        Ok(())
    }

    async fn insert_submission(&self, submission: &Submission) -> anyhow::Result<()> {
        self.collection::<Submission>("submission")
            .await
            .insert_one(submission)
            .await
            .context("unable to insert submission")?;
        Ok(())
    }

    async fn insert_enrollment(&self, enrollment: &Enrollment) -> anyhow::Result<()> {
        self.collection::<Enrollment>("enrollment")
            .await
            .insert_one(enrollment)
            .await
            .context("unable to insert enrollment")?;
        Ok(())
    }

    async fn delete_enrollment(&self, id: ObjectId) -> anyhow::Result<()> {
        self.collection::<Enrollment>("enrollment")
            .await
            .delete_one(doc! {"_id": id})
            .await
            .context("unable to delete enrollment")?;
        Ok(())
    }

    async fn delete_enrollments_by_cohort(&self, cohort_id: ObjectId) -> anyhow::Result<()> {
        self.collection::<Enrollment>("enrollment")
            .await
            .delete_many(doc! {"cohortId": cohort_id})
            .await
            .context("unable to delete enrollments for cohort")?;
        Ok(())
    }

    async fn delete_enrollments_by_user(&self, user_id: ObjectId) -> anyhow::Result<()> {
        self.collection::<Enrollment>("enrollment")
            .await
            .delete_many(doc! {"userId": user_id})
            .await
            .context("unable to delete enrollments for user")?;
        Ok(())
    }

    async fn insert_cohort(&self, cohort: &Cohort) -> anyhow::Result<()> {
        self.collection::<Cohort>("cohort")
            .await
            .insert_one(cohort)
            .await
            .context("unable to insert cohort")?;
        Ok(())
    }

    async fn delete_cohort(&self, id: ObjectId) -> anyhow::Result<()> {
        self.collection::<Cohort>("cohort")
            .await
            .delete_one(doc! {"_id": id})
            .await
            .context("unable to delete cohort")?;
        Ok(())
    }

    async fn insert_announcement(&self, announcement: &Announcement) -> anyhow::Result<()> {
        self.collection::<Announcement>("announcement")
            .await
            .insert_one(announcement)
            .await
            .context("unable to insert announcement")?;
        Ok(())
    }

    async fn delete_announcement(&self, id: ObjectId) -> anyhow::Result<()> {
        self.collection::<Announcement>("announcement")
            .await
            .delete_one(doc! {"_id": id})
            .await
            .context("unable to delete announcement")?;
        Ok(())
    }
}
