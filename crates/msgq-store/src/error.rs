#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("not found")]
    NotFound,
    #[error("schedule_id already exists")]
    DuplicateScheduleId,
}

pub type Result<T> = std::result::Result<T, Error>;
