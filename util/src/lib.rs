use nalgebra::RealField;

/// Asserts that two sequences of scalars agree entry by entry up to an absolute tolerance.
///
/// Prints the first offending index on failure, which is usually an element's global ordinal.
#[macro_export]
macro_rules! assert_approx_slice_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let x: &[_] = &$x;
        let y: &[_] = &$y;
        assert_eq!(x.len(), y.len(), "Sequences must have the same length.");
        if let Some(i) = $crate::first_mismatch(x, y, $tol) {
            println!("abstol: {:e}", $tol);
            println!("index {}: left = {:e}, right = {:e}", i, x[i], y[i]);
            panic!("assert_approx_slice_eq! failed at index {}", i);
        }
    }};
}

/// Returns the index of the first pair of entries that differ by more than `tol`.
pub fn first_mismatch<T: RealField + Copy>(x: &[T], y: &[T], tol: T) -> Option<usize> {
    x.iter()
        .zip(y)
        .position(|(&x_i, &y_i)| !((x_i - y_i).abs() <= tol))
}
