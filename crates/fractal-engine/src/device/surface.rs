/// What the frame loop should do after failing to acquire a surface texture.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Surface was reconfigured; rendering may resume next frame.
    Reconfigured,
    /// Transient error; skip the current frame.
    SkipFrame,
    /// Unrecoverable (out of memory); shut down.
    Fatal,
}

impl SurfaceErrorAction {
    pub(super) fn for_error(err: &wgpu::SurfaceError) -> Self {
        match err {
            wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => Self::Reconfigured,
            wgpu::SurfaceError::OutOfMemory => Self::Fatal,
            wgpu::SurfaceError::Timeout | wgpu::SurfaceError::Other => Self::SkipFrame,
        }
    }
}

const SRGB_PREFERENCE: [wgpu::TextureFormat; 2] = [
    wgpu::TextureFormat::Bgra8UnormSrgb,
    wgpu::TextureFormat::Rgba8UnormSrgb,
];

pub(super) fn choose_format(
    formats: &[wgpu::TextureFormat],
    prefer_srgb: bool,
) -> Option<wgpu::TextureFormat> {
    let preferred = prefer_srgb
        .then(|| SRGB_PREFERENCE.into_iter().find(|f| formats.contains(f)))
        .flatten();
    preferred.or_else(|| formats.first().copied())
}

pub(super) fn choose_alpha_mode(
    modes: &[wgpu::CompositeAlphaMode],
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| modes.contains(m))
        .or_else(|| modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}
