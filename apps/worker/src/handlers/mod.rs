//! Built-in job handlers.

mod email;
mod image;
mod math;

use std::sync::Arc;

use drudge_queue::{HandlerRegistry, QueueResult};
use tracing::info;

pub use email::EmailHandler;
pub use image::ImageHandler;
pub use math::MathHandler;

/// Register every built-in handler.
pub fn register_all(registry: &HandlerRegistry) -> QueueResult<()> {
    registry.register(Arc::new(EmailHandler::new()))?;
    registry.register(Arc::new(ImageHandler::new()))?;
    registry.register(Arc::new(MathHandler::new()))?;

    info!("all job handlers registered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_all() {
        let registry = HandlerRegistry::new();
        register_all(&registry).unwrap();

        let mut types = registry.job_types();
        types.sort();
        assert_eq!(types, vec!["email", "image_resize", "math"]);
    }

    #[test]
    fn test_register_all_twice_fails() {
        let registry = HandlerRegistry::new();
        register_all(&registry).unwrap();
        assert!(register_all(&registry).is_err());
    }
}
