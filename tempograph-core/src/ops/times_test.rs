#[cfg(test)]
mod tests {
    use crate::layout::FrameRange;
    use crate::matrix::Matrix;
    use crate::ops::{self, BackwardCtx, ForwardCtx, OpKind, ShapeInfo};

    // W = [[1, 2, 3], [4, 5, 6]] in column-major storage.
    fn weight() -> Matrix {
        Matrix::from_columns(2, 3, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]).unwrap()
    }

    fn samples() -> Matrix {
        Matrix::from_columns(3, 2, vec![1.0, 0.0, 1.0, 0.0, 1.0, 1.0]).unwrap()
    }

    #[test]
    fn test_times_forward() {
        let w = weight();
        let x = samples();
        let mut out = Matrix::zeros(2, 2);
        let mut scratch = None;
        let mut ctx = ForwardCtx {
            node_name: "proj",
            kind: &OpKind::Times,
            inputs: &[&w, &x],
            layout: None,
            frame: FrameRange::all(),
            out: &mut out,
            scratch: &mut scratch,
        };
        ops::forward(&mut ctx).unwrap();
        assert_eq!(out.data(), &[4.0, 10.0, 5.0, 11.0]);
    }

    #[test]
    fn test_times_backward_left_operand() {
        let w = weight();
        let x = samples();
        let own_value = Matrix::zeros(2, 2);
        let own_gradient = Matrix::from_columns(2, 2, vec![1.0, 1.0, 1.0, 1.0]).unwrap();
        let mut grad_out = Matrix::zeros(2, 3);
        let mut scratch = None;
        let mut ctx = BackwardCtx {
            node_name: "proj",
            kind: &OpKind::Times,
            input_index: 0,
            inputs: &[&w, &x],
            own_value: &own_value,
            own_gradient: &own_gradient,
            layout: None,
            frame: FrameRange::all(),
            grad_out: &mut grad_out,
            scratch: &mut scratch,
        };
        ops::backward(&mut ctx).unwrap();
        // dW = g * x^T with g all ones: each dW column is the x row sum.
        assert_eq!(grad_out.data(), &[1.0, 1.0, 1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_times_backward_right_operand() {
        let w = weight();
        let x = samples();
        let own_value = Matrix::zeros(2, 2);
        let own_gradient = Matrix::from_columns(2, 2, vec![1.0, 1.0, 1.0, 1.0]).unwrap();
        let mut grad_out = Matrix::zeros(3, 2);
        let mut scratch = None;
        let mut ctx = BackwardCtx {
            node_name: "proj",
            kind: &OpKind::Times,
            input_index: 1,
            inputs: &[&w, &x],
            own_value: &own_value,
            own_gradient: &own_gradient,
            layout: None,
            frame: FrameRange::all(),
            grad_out: &mut grad_out,
            scratch: &mut scratch,
        };
        ops::backward(&mut ctx).unwrap();
        // dX[:, j] = W^T * g[:, j] = column sums of W.
        assert_eq!(grad_out.data(), &[5.0, 7.0, 9.0, 5.0, 7.0, 9.0]);
    }

    #[test]
    fn test_times_shape_inner_dim_mismatch() {
        let a = ShapeInfo {
            name: "w",
            rows: 2,
            cols: 3,
            has_layout: false,
        };
        let b = ShapeInfo {
            name: "x",
            rows: 4,
            cols: 8,
            has_layout: true,
        };
        assert!(ops::infer_shape(&OpKind::Times, "proj", &[a, b], (0, 0)).is_err());
    }

    #[test]
    fn test_times_shape_unsettled_right() {
        let a = ShapeInfo {
            name: "w",
            rows: 2,
            cols: 3,
            has_layout: false,
        };
        let b = ShapeInfo {
            name: "x",
            rows: 0,
            cols: 0,
            has_layout: true,
        };
        let out = ops::infer_shape(&OpKind::Times, "proj", &[a, b], (0, 0)).unwrap();
        assert_eq!(out, (2, 0));
    }
}
