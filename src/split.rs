//! Chronological train/test split.

use crate::error::PipelineError;

/// Index of the first test row: `floor(n × fraction)`.
pub fn split_index(n: usize, fraction: f64) -> usize {
    ((n as f64) * fraction).floor() as usize
}

/// Splits time-ordered `rows` into a training prefix and a test suffix.
///
/// Fails when either side would be empty.
pub fn chronological_split<T>(rows: &[T], fraction: f64) -> Result<(&[T], &[T]), PipelineError> {
    let idx = split_index(rows.len(), fraction);
    if idx == 0 || idx >= rows.len() {
        return Err(PipelineError::InsufficientData(format!(
            "{} rows cannot be split at fraction {fraction}",
            rows.len()
        )));
    }
    Ok(rows.split_at(idx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_point_is_floored() {
        assert_eq!(split_index(10, 0.8), 8);
        assert_eq!(split_index(11, 0.8), 8);
        assert_eq!(split_index(240, 0.8), 192);
    }

    #[test]
    fn test_split_preserves_order() {
        let rows: Vec<u32> = (0..25).collect();
        let (train, test) = chronological_split(&rows, 0.8).unwrap();
        assert_eq!(train.len(), 20);
        assert_eq!(test.len(), 5);
        assert!(train.iter().max() <= test.iter().min());
        assert_eq!(train.last(), Some(&19));
        assert_eq!(test.first(), Some(&20));
    }

    #[test]
    fn test_too_few_rows_is_an_error() {
        assert!(chronological_split(&[1], 0.8).is_err());
        assert!(chronological_split::<u8>(&[], 0.8).is_err());
        assert!(chronological_split(&[1, 2], 0.8).is_ok());
    }
}
