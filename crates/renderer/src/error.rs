use crate::gl::{error_name, ResourceKind};
use crate::types::ShaderStage;

/// Failures raised while building or drawing a panel resource set.
///
/// Any of these aborts an in-progress construction; nothing partially built
/// is kept.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("failed to compile {stage} shader: {log}")]
    ShaderCompile { stage: ShaderStage, log: String },
    #[error("failed to link shader program: {log}")]
    ProgramLink { log: String },
    #[error("unexpected GL error {} (0x{code:04x}) after {operation}", error_name(*.code))]
    UnexpectedDriver { code: u32, operation: &'static str },
    #[error("failed to create {kind}: {reason}")]
    ObjectCreation { kind: ResourceKind, reason: String },
}

impl RenderError {
    /// True for errors reported by the driver's error flag.
    pub fn is_driver_error(&self) -> bool {
        matches!(self, RenderError::UnexpectedDriver { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_error_message_names_the_code() {
        let err = RenderError::UnexpectedDriver {
            code: glow::INVALID_OPERATION,
            operation: "draw_elements",
        };
        assert_eq!(
            err.to_string(),
            "unexpected GL error INVALID_OPERATION (0x0502) after draw_elements"
        );
        assert!(err.is_driver_error());
    }

    #[test]
    fn compile_message_carries_stage_and_log() {
        let err = RenderError::ShaderCompile {
            stage: ShaderStage::Fragment,
            log: "ERROR: 0:3: '}' : syntax error".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to compile fragment shader: ERROR: 0:3: '}' : syntax error"
        );
        assert!(!err.is_driver_error());
    }
}
