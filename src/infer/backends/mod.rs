pub mod stub;

#[cfg(feature = "backend-ort")]
pub mod ort;
#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::{ConstantBackend, ConstantFactory, UnavailableFactory};

#[cfg(feature = "backend-ort")]
pub use self::ort::{OrtBackend, OrtFactory};
#[cfg(feature = "backend-tract")]
pub use self::tract::{TractBackend, TractFactory};

use crate::infer::backend::{Accelerator, BackendFactory};

/// Factories built into this binary for one accelerator, most preferred first.
pub(crate) fn compiled_factories(accelerator: Accelerator) -> Vec<Box<dyn BackendFactory>> {
    let mut factories: Vec<Box<dyn BackendFactory>> = Vec::new();
    match accelerator {
        Accelerator::Gpu => {
            #[cfg(feature = "backend-ort")]
            factories.push(Box::new(OrtFactory::gpu()));
        }
        Accelerator::Native => {
            #[cfg(feature = "backend-ort")]
            factories.push(Box::new(OrtFactory::native()));
        }
        Accelerator::Cpu => {
            #[cfg(feature = "backend-tract")]
            factories.push(Box::new(TractFactory));
            #[cfg(feature = "backend-ort")]
            factories.push(Box::new(OrtFactory::cpu()));
        }
    }
    if factories.is_empty() {
        factories.push(Box::new(UnavailableFactory::new(
            accelerator,
            "no backend compiled in",
        )));
    }
    factories
}
