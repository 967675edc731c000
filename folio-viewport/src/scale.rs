use crate::config::EngineConfig;
use crate::Size;

/// Scale applied when the inputs to a fit are unusable.
pub const FALLBACK_SCALE: f32 = 1.0;

/// A computed ratio at or below this is treated as unusable.
const MIN_USABLE_SCALE: f32 = 0.01;

/// What the host asked the zoom to be. Fit variants are resolved once against
/// current geometry and then collapse into an explicit percentage; they do not
/// track later container resizes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoomIntent {
    /// Zoom percentage, 100.0 meaning actual size.
    Explicit(f32),
    /// Match the container width. Uses the engine's container size.
    FitWidth,
    /// Fit the whole page. `None` targets the engine's container size.
    FitPage(Option<Size>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScaleOutcome {
    Resolved(f32),
    /// The reference page's intrinsic size is not known yet.
    Pending,
}

/// Resolves an intent to a multiplicative scale factor. `reference` is the
/// intrinsic size of the page the fit is computed against; fits cannot resolve
/// without it.
pub fn resolve(
    intent: ZoomIntent,
    reference: Option<Size>,
    container: Size,
    config: &EngineConfig,
) -> ScaleOutcome {
    match intent {
        ZoomIntent::Explicit(percent) => {
            ScaleOutcome::Resolved(config.clamp_percent(percent) / 100.0)
        }
        ZoomIntent::FitWidth => match reference {
            None => ScaleOutcome::Pending,
            Some(page) => ScaleOutcome::Resolved(fit_width(page, container, config)),
        },
        ZoomIntent::FitPage(target) => match reference {
            None => ScaleOutcome::Pending,
            Some(page) => {
                ScaleOutcome::Resolved(fit_page(page, target.unwrap_or(container), config))
            }
        },
    }
}

fn fit_width(page: Size, container: Size, config: &EngineConfig) -> f32 {
    if container.width <= 0.0 || page.width <= 0.0 {
        return FALLBACK_SCALE;
    }
    sanitize(container.width / page.width, config)
}

fn fit_page(page: Size, target: Size, config: &EngineConfig) -> f32 {
    if target.width <= 0.0 || target.height <= 0.0 || page.is_degenerate() {
        return FALLBACK_SCALE;
    }
    let width = target.width / page.width;
    let height = target.height / page.height;
    sanitize(width.min(height), config)
}

fn sanitize(scale: f32, config: &EngineConfig) -> f32 {
    if !scale.is_finite() || scale <= MIN_USABLE_SCALE {
        return FALLBACK_SCALE;
    }
    config.clamp_percent(scale * 100.0) / 100.0
}
