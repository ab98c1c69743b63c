/// Identifies where a node keeps its numeric buffers.
///
/// Device affinity is tracked per node and per buffer; all buffers of one
/// node live on the same device, and migration moves them together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    /// Main system memory. This is the default device and the only one with
    /// compute kernels wired up.
    #[default]
    Cpu,
    /// CUDA device memory.
    ///
    /// Buffers may be tagged for the GPU, but evaluating a GPU-resident node
    /// currently fails with `UnsupportedOperation`.
    Gpu,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_cpu() {
        assert_eq!(Device::default(), Device::Cpu);
    }
}
