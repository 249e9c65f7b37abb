//! Host-side registry of contexts.
//!
//! A `Runtime` owns up to [`MAX_CONTEXTS`] independent contexts. Exactly
//! one is current; contexts other than 0 are created on first switch.

use crate::config::VmConfig;
use crate::error::ContextError;
use crate::vm::Vm;

pub const MAX_CONTEXTS: usize = 16;

pub struct Runtime {
    config: VmConfig,
    contexts: Vec<Option<Vm>>,
    current: usize,
}

impl Runtime {
    /// Creates the registry with context 0 initialized and current.
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        let mut contexts: Vec<Option<Vm>> = (0..MAX_CONTEXTS).map(|_| None).collect();
        contexts[0] = Some(Vm::with_config(config.clone()));
        log::debug!("runtime initialized with context 0");
        Self { config, contexts, current: 0 }
    }

    #[inline]
    pub fn current(&self) -> usize {
        self.current
    }

    /// The current context.
    pub fn vm(&mut self) -> &mut Vm {
        self.contexts[self.current].as_mut().expect("current context is initialized")
    }

    /// Makes context `index` current, creating it if needed.
    pub fn switch(&mut self, index: usize) -> Result<(), ContextError> {
        if index >= MAX_CONTEXTS {
            return Err(ContextError::OutOfRange { index, max: MAX_CONTEXTS });
        }
        if self.contexts[index].is_none() {
            log::debug!("creating context {index}");
            self.contexts[index] = Some(Vm::with_config(self.config.clone()));
        }
        log::trace!("switching context {} -> {index}", self.current);
        self.current = index;
        Ok(())
    }

    /// Tears down the current context and replaces it with a fresh one.
    pub fn reset(&mut self) {
        let i = self.current;
        log::debug!("resetting context {i}");
        // the old context is finalized before the new one is built
        self.contexts[i] = None;
        self.contexts[i] = Some(Vm::with_config(self.config.clone()));
    }

    pub fn get(&self, index: usize) -> Result<&Vm, ContextError> {
        match self.contexts.get(index) {
            None => Err(ContextError::OutOfRange { index, max: MAX_CONTEXTS }),
            Some(slot) => slot.as_ref().ok_or(ContextError::NotInitialized(index)),
        }
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut Vm, ContextError> {
        match self.contexts.get_mut(index) {
            None => Err(ContextError::OutOfRange { index, max: MAX_CONTEXTS }),
            Some(slot) => slot.as_mut().ok_or(ContextError::NotInitialized(index)),
        }
    }

    /// Number of initialized contexts.
    pub fn len(&self) -> usize {
        self.contexts.iter().filter(|c| c.is_some()).count()
    }

    /// Finalizes every context, highest index first.
    pub fn teardown(mut self) {
        self.drop_contexts();
    }

    fn drop_contexts(&mut self) {
        for (i, slot) in self.contexts.iter_mut().enumerate().rev() {
            if slot.take().is_some() {
                log::debug!("context {i} torn down");
            }
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.drop_contexts();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_contexts_are_isolated() {
        let mut rt = Runtime::new();
        let name = rt.vm().intern("answer");
        rt.vm().set_global(name, Value::Int(42));
        rt.switch(3).unwrap();
        assert_eq!(rt.current(), 3);
        let name = rt.vm().intern("answer");
        assert_eq!(rt.vm().get_global(name), None);
        rt.switch(0).unwrap();
        let name = rt.vm().intern("answer");
        assert_eq!(rt.vm().get_global(name), Some(Value::Int(42)));
        assert_eq!(rt.len(), 2);
    }

    #[test]
    fn test_switch_out_of_range() {
        let mut rt = Runtime::new();
        assert_eq!(rt.switch(MAX_CONTEXTS), Err(ContextError::OutOfRange { index: 16, max: 16 }));
        assert_eq!(rt.current(), 0);
        assert_eq!(rt.get(5).err(), Some(ContextError::NotInitialized(5)));
    }

    #[test]
    fn test_reset_clears_state() {
        let mut rt = Runtime::new();
        let name = rt.vm().intern("x");
        rt.vm().set_global(name, Value::Int(1));
        rt.reset();
        let name = rt.vm().intern("x");
        assert_eq!(rt.vm().get_global(name), None);
    }
}
