#[cfg(test)]
mod tests {
    use crate::layout::FrameRange;
    use crate::matrix::Matrix;
    use crate::ops::{self, BackwardCtx, ForwardCtx, OpKind};

    #[test]
    fn test_element_times_forward() {
        let a = Matrix::from_columns(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Matrix::from_columns(2, 2, vec![2.0, 2.0, 0.5, 0.5]).unwrap();
        let mut out = Matrix::zeros(2, 2);
        let mut scratch = None;
        let mut ctx = ForwardCtx {
            node_name: "gate",
            kind: &OpKind::ElementTimes,
            inputs: &[&a, &b],
            layout: None,
            frame: FrameRange::all(),
            out: &mut out,
            scratch: &mut scratch,
        };
        ops::forward(&mut ctx).unwrap();
        assert_eq!(out.data(), &[2.0, 4.0, 1.5, 2.0]);
    }

    #[test]
    fn test_element_times_forward_broadcasts_scale() {
        let a = Matrix::from_columns(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let scale = Matrix::from_columns(2, 1, vec![10.0, 0.1]).unwrap();
        let mut out = Matrix::zeros(2, 2);
        let mut scratch = None;
        let mut ctx = ForwardCtx {
            node_name: "gate",
            kind: &OpKind::ElementTimes,
            inputs: &[&a, &scale],
            layout: None,
            frame: FrameRange::all(),
            out: &mut out,
            scratch: &mut scratch,
        };
        ops::forward(&mut ctx).unwrap();
        assert_eq!(out.data(), &[10.0, 0.2, 30.0, 0.4]);
    }

    #[test]
    fn test_element_times_backward_uses_other_operand() {
        let a = Matrix::from_columns(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Matrix::from_columns(2, 2, vec![5.0, 6.0, 7.0, 8.0]).unwrap();
        let own_value = Matrix::zeros(2, 2);
        let own_gradient = Matrix::from_columns(2, 2, vec![1.0, 1.0, 1.0, 1.0]).unwrap();
        let mut grad_out = Matrix::zeros(2, 2);
        let mut scratch = None;
        let mut ctx = BackwardCtx {
            node_name: "gate",
            kind: &OpKind::ElementTimes,
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
        // dL/da = g * b
        assert_eq!(grad_out.data(), b.data());
    }

    #[test]
    fn test_element_times_backward_collapses_broadcast() {
        let a = Matrix::from_columns(1, 3, vec![2.0, 3.0, 4.0]).unwrap();
        let scale = Matrix::from_columns(1, 1, vec![10.0]).unwrap();
        let own_value = Matrix::zeros(1, 3);
        let own_gradient = Matrix::from_columns(1, 3, vec![1.0, 1.0, 1.0]).unwrap();
        let mut grad_out = Matrix::zeros(1, 1);
        let mut scratch = None;
        let mut ctx = BackwardCtx {
            node_name: "gate",
            kind: &OpKind::ElementTimes,
            input_index: 1,
            inputs: &[&a, &scale],
            own_value: &own_value,
            own_gradient: &own_gradient,
            layout: None,
            frame: FrameRange::all(),
            grad_out: &mut grad_out,
            scratch: &mut scratch,
        };
        ops::backward(&mut ctx).unwrap();
        // dL/dscale = sum(g * a)
        assert_eq!(grad_out.data(), &[9.0]);
    }
}
