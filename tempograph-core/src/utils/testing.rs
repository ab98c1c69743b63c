use approx::relative_eq;

use crate::matrix::Matrix;

/// Checks that a matrix has the expected shape and element-wise contents
/// within `tolerance`. Panics with the offending index on mismatch.
pub fn check_matrix_near(
    actual: &Matrix,
    expected_shape: (usize, usize),
    expected_data: &[f32],
    tolerance: f32,
) {
    assert_eq!(actual.shape(), expected_shape, "shape mismatch");
    assert_eq!(
        actual.data().len(),
        expected_data.len(),
        "data length mismatch"
    );
    for (i, (a, e)) in actual.data().iter().zip(expected_data.iter()).enumerate() {
        if !relative_eq!(a, e, epsilon = tolerance, max_relative = tolerance) {
            panic!(
                "data mismatch at index {i}: actual={a}, expected={e}, tolerance={tolerance}"
            );
        }
    }
}
