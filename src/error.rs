use thiserror::Error;

pub type Result<T> = std::result::Result<T, PagerError>;

#[derive(Debug, Error)]
pub enum PagerError {
    #[error("loss type must be one of (\"fatality\",\"economic\"), got '{0}'")]
    InvalidLossType(String),

    #[error("malformed growth table for country {code}: {reason}")]
    MalformedGrowthTable { code: u32, reason: String },

    #[error(
        "event year is {years} years after the population data year (limit {limit}); \
         results this far in the future are not valid"
    )]
    StaleData { years: i32, limit: i32 },

    #[error("grids are not aligned: {0}")]
    Alignment(String),

    #[error("grid data has {actual} values but its geodict describes {expected} cells")]
    GridShape { expected: usize, actual: usize },

    #[error("the {0} grid is required for this model")]
    MissingGrid(&'static str),
}
