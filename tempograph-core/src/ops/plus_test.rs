#[cfg(test)]
mod tests {
    use crate::layout::{FrameRange, MinibatchLayout};
    use crate::matrix::Matrix;
    use crate::ops::{self, BackwardCtx, ForwardCtx, OpKind};

    fn run_forward(
        a: &Matrix,
        b: &Matrix,
        layout: Option<&MinibatchLayout>,
        frame: FrameRange,
        out: &mut Matrix,
    ) {
        let mut scratch = None;
        let mut ctx = ForwardCtx {
            node_name: "sum",
            kind: &OpKind::Plus,
            inputs: &[a, b],
            layout,
            frame,
            out,
            scratch: &mut scratch,
        };
        ops::forward(&mut ctx).unwrap();
    }

    #[test]
    fn test_plus_forward() {
        let a = Matrix::from_columns(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Matrix::from_columns(2, 2, vec![10.0, 20.0, 30.0, 40.0]).unwrap();
        let mut out = Matrix::zeros(2, 2);
        run_forward(&a, &b, None, FrameRange::all(), &mut out);
        assert_eq!(out.data(), &[11.0, 22.0, 33.0, 44.0]);
    }

    #[test]
    fn test_plus_forward_broadcasts_bias() {
        let a = Matrix::from_columns(2, 3, vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0]).unwrap();
        let bias = Matrix::from_columns(2, 1, vec![0.5, -0.5]).unwrap();
        let mut out = Matrix::zeros(2, 3);
        run_forward(&a, &bias, None, FrameRange::all(), &mut out);
        assert_eq!(out.data(), &[1.5, 0.5, 2.5, 1.5, 3.5, 2.5]);
    }

    #[test]
    fn test_plus_forward_single_timestep() {
        // 2 steps x 2 slots; only step 1 is written.
        let layout = MinibatchLayout::new(2, 2);
        let a = Matrix::from_columns(1, 4, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Matrix::from_columns(1, 4, vec![10.0, 10.0, 10.0, 10.0]).unwrap();
        let mut out = Matrix::zeros(1, 4);
        run_forward(&a, &b, Some(&layout), FrameRange::at(1), &mut out);
        assert_eq!(out.data(), &[0.0, 0.0, 13.0, 14.0]);
    }

    #[test]
    fn test_plus_backward_accumulates() {
        let a = Matrix::zeros(2, 2);
        let b = Matrix::zeros(2, 2);
        let own_value = Matrix::zeros(2, 2);
        let own_gradient = Matrix::from_columns(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        // Pre-existing gradient from another consumer must survive.
        let mut grad_out = Matrix::from_columns(2, 2, vec![100.0, 100.0, 100.0, 100.0]).unwrap();
        let mut scratch = None;
        let mut ctx = BackwardCtx {
            node_name: "sum",
            kind: &OpKind::Plus,
            input_index: 0,
            inputs: &[&a, &b],
            own_value: &own_value,
            own_gradient: &own_gradient,
            layout: None,
            frame: FrameRange::all(),
            grad_out: &mut grad_out,
            scratch: &mut scratch,
        };
        ops::backward(&mut ctx).unwrap();
        assert_eq!(grad_out.data(), &[101.0, 102.0, 103.0, 104.0]);
    }

    #[test]
    fn test_plus_backward_collapses_broadcast_bias() {
        let a = Matrix::zeros(2, 3);
        let bias = Matrix::zeros(2, 1);
        let own_value = Matrix::zeros(2, 3);
        let own_gradient =
            Matrix::from_columns(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let mut grad_out = Matrix::zeros(2, 1);
        let mut scratch = None;
        let mut ctx = BackwardCtx {
            node_name: "sum",
            kind: &OpKind::Plus,
            input_index: 1,
            inputs: &[&a, &bias],
            own_value: &own_value,
            own_gradient: &own_gradient,
            layout: None,
            frame: FrameRange::all(),
            grad_out: &mut grad_out,
            scratch: &mut scratch,
        };
        ops::backward(&mut ctx).unwrap();
        assert_eq!(grad_out.data(), &[9.0, 12.0]);
    }
}
