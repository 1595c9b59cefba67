#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    InvalidCourse(String),
    #[error("{0}")]
    InvalidEnrollment(String),
}
