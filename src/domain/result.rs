//! Result type alias for gridstats

use super::errors::GridError;

/// Result type alias for gridstats operations
///
/// # Examples
///
/// ```
/// use gridstats::domain::result::Result;
/// use gridstats::domain::errors::GridError;
///
/// fn failing_function() -> Result<()> {
///     Err(GridError::Validation("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, GridError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_with_question_mark() -> Result<()> {
        fn inner() -> Result<i32> {
            Ok(42)
        }

        let value = inner()?;
        assert_eq!(value, 42);
        Ok(())
    }
}
