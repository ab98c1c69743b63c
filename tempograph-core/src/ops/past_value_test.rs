#[cfg(test)]
mod tests {
    use crate::layout::{CellFlags, FrameRange, MinibatchLayout};
    use crate::matrix::Matrix;
    use crate::ops::{self, BackwardCtx, ForwardCtx, OpKind};

    fn delay_kind(delay: usize) -> OpKind {
        OpKind::PastValue {
            delay,
            initial_activation: 0.1,
        }
    }

    fn run_forward(
        kind: &OpKind,
        input: &Matrix,
        layout: &MinibatchLayout,
        frame: FrameRange,
        out: &mut Matrix,
    ) {
        let mut scratch = None;
        let mut ctx = ForwardCtx {
            node_name: "prev",
            kind,
            inputs: &[input],
            layout: Some(layout),
            frame,
            out,
            scratch: &mut scratch,
        };
        ops::forward(&mut ctx).unwrap();
    }

    #[test]
    fn test_past_value_shifts_one_step() {
        let mut layout = MinibatchLayout::new(3, 1);
        layout.add_flags(0, 0, CellFlags::SEQUENCE_START);
        layout.add_flags(2, 0, CellFlags::SEQUENCE_END);
        let input = Matrix::from_columns(1, 3, vec![10.0, 20.0, 30.0]).unwrap();
        let mut out = Matrix::zeros(1, 3);
        run_forward(&delay_kind(1), &input, &layout, FrameRange::all(), &mut out);
        assert_eq!(out.data(), &[0.1, 10.0, 20.0]);
    }

    #[test]
    fn test_past_value_deeper_delay() {
        let mut layout = MinibatchLayout::new(4, 1);
        layout.add_flags(0, 0, CellFlags::SEQUENCE_START);
        layout.add_flags(3, 0, CellFlags::SEQUENCE_END);
        let input = Matrix::from_columns(1, 4, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut out = Matrix::zeros(1, 4);
        run_forward(&delay_kind(2), &input, &layout, FrameRange::all(), &mut out);
        assert_eq!(out.data(), &[0.1, 0.1, 1.0, 2.0]);
    }

    #[test]
    fn test_past_value_resets_at_mid_slot_sequence_start() {
        // Two sequences share slot 0: steps 0..2 and steps 2..4.
        let mut layout = MinibatchLayout::new(4, 1);
        layout.add_flags(0, 0, CellFlags::SEQUENCE_START);
        layout.add_flags(1, 0, CellFlags::SEQUENCE_END);
        layout.add_flags(2, 0, CellFlags::SEQUENCE_START);
        layout.add_flags(3, 0, CellFlags::SEQUENCE_END);
        let input = Matrix::from_columns(1, 4, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut out = Matrix::zeros(1, 4);
        run_forward(&delay_kind(1), &input, &layout, FrameRange::all(), &mut out);
        // The second sequence restarts from the initial activation.
        assert_eq!(out.data(), &[0.1, 1.0, 0.1, 3.0]);
    }

    #[test]
    fn test_past_value_per_slot_histories() {
        let mut layout = MinibatchLayout::new(2, 2);
        for s in 0..2 {
            layout.add_flags(0, s, CellFlags::SEQUENCE_START);
            layout.add_flags(1, s, CellFlags::SEQUENCE_END);
        }
        // Columns in t-major order: (0,0) (0,1) (1,0) (1,1).
        let input =
            Matrix::from_columns(2, 4, vec![1.0, 2.0, 5.0, 6.0, 3.0, 4.0, 7.0, 8.0]).unwrap();
        let mut out = Matrix::zeros(2, 4);
        run_forward(&delay_kind(1), &input, &layout, FrameRange::all(), &mut out);
        // Step 1 of each slot sees that slot's step 0.
        assert_eq!(out.column(2), &[1.0, 2.0]);
        assert_eq!(out.column(3), &[5.0, 6.0]);
        assert_eq!(out.column(0), &[0.1, 0.1]);
    }

    #[test]
    fn test_past_value_per_timestep_matches_whole_batch() {
        let mut layout = MinibatchLayout::new(3, 2);
        for s in 0..2 {
            layout.add_flags(0, s, CellFlags::SEQUENCE_START);
            layout.add_flags(2, s, CellFlags::SEQUENCE_END);
        }
        let input = Matrix::from_columns(
            1,
            6,
            vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0],
        )
        .unwrap();
        let mut whole = Matrix::zeros(1, 6);
        run_forward(&delay_kind(1), &input, &layout, FrameRange::all(), &mut whole);
        let mut stepped = Matrix::zeros(1, 6);
        for t in 0..3 {
            run_forward(&delay_kind(1), &input, &layout, FrameRange::at(t), &mut stepped);
        }
        assert_eq!(whole.data(), stepped.data());
    }

    #[test]
    fn test_past_value_backward_routes_gradient() {
        let mut layout = MinibatchLayout::new(3, 1);
        layout.add_flags(0, 0, CellFlags::SEQUENCE_START);
        layout.add_flags(2, 0, CellFlags::SEQUENCE_END);
        let kind = delay_kind(1);
        let input = Matrix::from_columns(1, 3, vec![1.0, 2.0, 3.0]).unwrap();
        let own_value = Matrix::zeros(1, 3);
        let own_gradient = Matrix::from_columns(1, 3, vec![5.0, 6.0, 7.0]).unwrap();
        let mut grad_out = Matrix::zeros(1, 3);
        let mut scratch = None;
        let mut ctx = BackwardCtx {
            node_name: "prev",
            kind: &kind,
            input_index: 0,
            inputs: &[&input],
            own_value: &own_value,
            own_gradient: &own_gradient,
            layout: Some(&layout),
            frame: FrameRange::all(),
            grad_out: &mut grad_out,
            scratch: &mut scratch,
        };
        ops::backward(&mut ctx).unwrap();
        // Step 0 read the initial activation, so only steps 1 and 2 route
        // gradient back, to steps 0 and 1.
        assert_eq!(grad_out.data(), &[6.0, 7.0, 0.0]);
    }
}
