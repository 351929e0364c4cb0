use crate::error::{BackendInitError, ModelLoadError};
use crate::infer::backend::{
    Accelerator, AcceleratorPreference, BackendFactory, InputSpec, ModelBackend,
};
use crate::infer::backends;
use crate::infer::model::ModelAsset;

/// Ordered list of backend constructors. First success wins; exhaustion is fatal.
pub struct BackendChain {
    factories: Vec<Box<dyn BackendFactory>>,
}

impl BackendChain {
    pub fn new() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    /// Chain of every compiled-in factory, in the order the preference asks for.
    ///
    /// An accelerator with no backend compiled in still gets an entry, so the fallback is
    /// logged the same way as a runtime probe failure.
    pub fn for_preference(preference: AcceleratorPreference) -> Self {
        let mut chain = Self::new();
        for accelerator in preference.chain() {
            for factory in backends::compiled_factories(*accelerator) {
                chain.factories.push(factory);
            }
        }
        chain
    }

    /// Append a factory to the end of the chain.
    pub fn register<F: BackendFactory + 'static>(&mut self, factory: F) {
        self.factories.push(Box::new(factory));
    }

    pub fn with<F: BackendFactory + 'static>(mut self, factory: F) -> Self {
        self.register(factory);
        self
    }

    /// `name (accelerator)` for each entry, in order.
    pub fn list(&self) -> Vec<String> {
        self.factories
            .iter()
            .map(|factory| format!("{} ({})", factory.name(), factory.accelerator()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Try each factory in order.
    pub fn build(
        &self,
        model: &ModelAsset,
        input: &InputSpec,
    ) -> Result<Box<dyn ModelBackend>, ModelLoadError> {
        if model.is_empty() {
            return Err(ModelLoadError::Empty);
        }
        let mut attempts: Vec<BackendInitError> = Vec::new();
        for factory in &self.factories {
            log::debug!(
                "InferenceEngine: trying {} on {}",
                factory.name(),
                factory.accelerator()
            );
            match factory.build(model, input) {
                Ok(backend) => {
                    log::info!(
                        "InferenceEngine: {} loaded on {} ({} fallback(s))",
                        backend.name(),
                        backend.accelerator(),
                        attempts.len()
                    );
                    return Ok(backend);
                }
                Err(err) => {
                    log::warn!("InferenceEngine: {}; falling back", err);
                    attempts.push(err);
                }
            }
        }
        Err(ModelLoadError::Exhausted { attempts })
    }

    /// Accelerators covered by this chain, in order, without repeats.
    pub fn accelerators(&self) -> Vec<Accelerator> {
        let mut seen = Vec::new();
        for factory in &self.factories {
            if !seen.contains(&factory.accelerator()) {
                seen.push(factory.accelerator());
            }
        }
        seen
    }
}

impl Default for BackendChain {
    fn default() -> Self {
        Self::for_preference(AcceleratorPreference::Auto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::backend::TensorLayout;
    use crate::infer::backends::{ConstantFactory, UnavailableFactory};

    fn input() -> InputSpec {
        InputSpec {
            shape: [4, 4, 3],
            layout: TensorLayout::Nhwc,
        }
    }

    #[test]
    fn first_success_wins() -> anyhow::Result<()> {
        let chain = BackendChain::new()
            .with(ConstantFactory::new(Accelerator::Native, 0.1))
            .with(ConstantFactory::new(Accelerator::Cpu, 0.2));
        let backend = chain.build(&ModelAsset::from_bytes("m", vec![1]), &input())?;
        assert_eq!(backend.accelerator(), Accelerator::Native);
        Ok(())
    }

    #[test]
    fn unavailable_accelerators_fall_through_to_cpu() -> anyhow::Result<()> {
        let chain = BackendChain::new()
            .with(UnavailableFactory::new(Accelerator::Gpu, "no device"))
            .with(UnavailableFactory::new(Accelerator::Native, "no npu"))
            .with(ConstantFactory::new(Accelerator::Cpu, 0.2));
        let backend = chain.build(&ModelAsset::from_bytes("m", vec![1]), &input())?;
        assert_eq!(backend.accelerator(), Accelerator::Cpu);
        Ok(())
    }

    #[test]
    fn exhaustion_keeps_every_attempt() {
        let chain = BackendChain::new()
            .with(UnavailableFactory::new(Accelerator::Gpu, "no device"))
            .with(UnavailableFactory::new(Accelerator::Cpu, "disabled"));
        match chain.build(&ModelAsset::from_bytes("m", vec![1]), &input()) {
            Err(ModelLoadError::Exhausted { attempts }) => assert_eq!(attempts.len(), 2),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("chain should be exhausted"),
        }
    }

    #[test]
    fn empty_model_is_rejected_before_any_backend() {
        let chain = BackendChain::new().with(ConstantFactory::new(Accelerator::Cpu, 0.5));
        assert!(matches!(
            chain.build(&ModelAsset::from_bytes("m", Vec::new()), &input()),
            Err(ModelLoadError::Empty)
        ));
    }

    #[test]
    fn preference_chain_orders_accelerators() {
        let chain = BackendChain::for_preference(AcceleratorPreference::Auto);
        let accelerators = chain.accelerators();
        assert_eq!(accelerators.first(), Some(&Accelerator::Gpu));
        assert_eq!(accelerators.last(), Some(&Accelerator::Cpu));

        let cpu_only = BackendChain::for_preference(AcceleratorPreference::Cpu);
        assert!(cpu_only
            .accelerators()
            .iter()
            .all(|acc| *acc == Accelerator::Cpu));
    }
}
