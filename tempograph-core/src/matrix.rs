use crate::device::Device;
use crate::error::TempoGraphError;

/// Dense column-major `f32` buffer.
///
/// Columns are the unit of minibatch addressing: for a buffer bound to a
/// `steps x slots` layout, column `j = t * slots + s` holds the sample of
/// parallel sequence `s` at timestep `t` and is contiguous in memory, so
/// frame-level kernels and masking work on contiguous slices.
///
/// The buffer carries a [`Device`] tag. Kernels check the tag at dispatch;
/// the accessors here assume host-visible memory.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
    device: Device,
}

impl Matrix {
    /// Creates a zero-filled `rows x cols` buffer on the given device.
    pub fn new(rows: usize, cols: usize, device: Device) -> Self {
        Matrix {
            rows,
            cols,
            data: vec![0.0; rows * cols],
            device,
        }
    }

    /// Creates a zero-filled CPU buffer.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::new(rows, cols, Device::Cpu)
    }

    /// Builds a CPU buffer from column-major data.
    ///
    /// # Errors
    /// Fails with `MatrixCreation` when `data.len() != rows * cols`.
    pub fn from_columns(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, TempoGraphError> {
        if data.len() != rows * cols {
            return Err(TempoGraphError::MatrixCreation {
                rows,
                cols,
                data_len: data.len(),
            });
        }
        Ok(Matrix {
            rows,
            cols,
            data,
            device: Device::Cpu,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn numel(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.numel() == 0
    }

    /// Destructively resizes the buffer. Contents afterwards are
    /// unspecified; callers must treat the buffer as uninitialized.
    pub fn resize(&mut self, rows: usize, cols: usize) {
        self.rows = rows;
        self.cols = cols;
        self.data.clear();
        self.data.resize(rows * cols, 0.0);
    }

    /// Overwrites every element with `value`.
    pub fn fill(&mut self, value: f32) {
        for v in self.data.iter_mut() {
            *v = value;
        }
    }

    /// Retags the buffer for another device.
    ///
    /// Today every device shares the host address space, so this is a tag
    /// move; the data vector stays in place.
    pub fn to_device(&mut self, device: Device) {
        self.device = device;
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Element accessor, column-major: `(r, c)` maps to `r + c * rows`.
    pub fn at(&self, row: usize, col: usize) -> f32 {
        debug_assert!(row < self.rows && col < self.cols);
        self.data[row + col * self.rows]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        debug_assert!(row < self.rows && col < self.cols);
        self.data[row + col * self.rows] = value;
    }

    /// Contiguous view of column `col`.
    pub fn column(&self, col: usize) -> &[f32] {
        debug_assert!(col < self.cols);
        &self.data[col * self.rows..(col + 1) * self.rows]
    }

    pub fn column_mut(&mut self, col: usize) -> &mut [f32] {
        debug_assert!(col < self.cols);
        let rows = self.rows;
        &mut self.data[col * rows..(col + 1) * rows]
    }

    /// Contiguous view of `count` columns starting at `start`.
    pub fn columns(&self, start: usize, count: usize) -> &[f32] {
        debug_assert!(start + count <= self.cols);
        &self.data[start * self.rows..(start + count) * self.rows]
    }

    pub fn columns_mut(&mut self, start: usize, count: usize) -> &mut [f32] {
        debug_assert!(start + count <= self.cols);
        let rows = self.rows;
        &mut self.data[start * rows..(start + count) * rows]
    }

    /// Sum over every element.
    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    /// Adds `other` element-wise into `self`.
    ///
    /// # Errors
    /// Fails with `MatrixCreation` style shape data when shapes differ; the
    /// caller is expected to wrap this into a contextful error.
    pub fn add_assign(&mut self, other: &Matrix) -> Result<(), TempoGraphError> {
        if self.shape() != other.shape() {
            return Err(TempoGraphError::MatrixCreation {
                rows: self.rows,
                cols: self.cols,
                data_len: other.numel(),
            });
        }
        for (dst, src) in self.data.iter_mut().zip(other.data.iter()) {
            *dst += *src;
        }
        Ok(())
    }

    /// Applies `f` to every element in place.
    pub fn map_in_place<F: Fn(f32) -> f32>(&mut self, f: F) {
        for v in self.data.iter_mut() {
            *v = f(*v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let m = Matrix::zeros(3, 2);
        assert_eq!(m.shape(), (3, 2));
        assert_eq!(m.numel(), 6);
        assert!(m.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_from_columns_checks_length() {
        let err = Matrix::from_columns(2, 2, vec![1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(
            err,
            TempoGraphError::MatrixCreation {
                rows: 2,
                cols: 2,
                data_len: 3
            }
        );
    }

    #[test]
    fn test_column_major_addressing() {
        // 2x3: columns are [1,2], [3,4], [5,6]
        let m = Matrix::from_columns(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(m.at(0, 0), 1.0);
        assert_eq!(m.at(1, 0), 2.0);
        assert_eq!(m.at(0, 2), 5.0);
        assert_eq!(m.column(1), &[3.0, 4.0]);
        assert_eq!(m.columns(1, 2), &[3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_resize_is_destructive() {
        let mut m = Matrix::from_columns(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        m.resize(2, 3);
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m.numel(), 6);
    }

    #[test]
    fn test_add_assign() {
        let mut a = Matrix::from_columns(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Matrix::from_columns(2, 2, vec![10.0, 20.0, 30.0, 40.0]).unwrap();
        a.add_assign(&b).unwrap();
        assert_eq!(a.data(), &[11.0, 22.0, 33.0, 44.0]);
        let c = Matrix::zeros(3, 2);
        assert!(a.add_assign(&c).is_err());
    }

    #[test]
    fn test_map_in_place_and_sum() {
        let mut m = Matrix::from_columns(1, 4, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        m.map_in_place(|v| v * 2.0);
        assert_eq!(m.sum(), 20.0);
    }

    #[test]
    fn test_device_tag_moves_with_buffer() {
        let mut m = Matrix::zeros(1, 1);
        assert_eq!(m.device(), Device::Cpu);
        m.to_device(Device::Gpu);
        assert_eq!(m.device(), Device::Gpu);
    }
}
