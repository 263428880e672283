/// Initialization parameters for the GPU layer.
#[derive(Debug, Clone)]
pub struct GpuInit {
    /// Prefer an sRGB surface format; materials are specified in linear space.
    pub prefer_srgb: bool,

    pub present_mode: wgpu::PresentMode,

    /// Used if supported by the surface, otherwise the first supported mode.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,

    pub power_preference: wgpu::PowerPreference,

    pub required_features: wgpu::Features,

    /// Limits requested from the adapter. `max_buffer_size` bounds the largest
    /// per-level instance buffer.
    pub required_limits: wgpu::Limits,

    /// Hint; support depends on platform/backend.
    pub desired_maximum_frame_latency: u32,
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            prefer_srgb: true,
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: None,
            power_preference: wgpu::PowerPreference::HighPerformance,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            desired_maximum_frame_latency: 2,
        }
    }
}
