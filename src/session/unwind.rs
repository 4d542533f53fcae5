use crate::mask::MaskSet;
use crate::mount::MountHandle;

/// Inverse of one acquisition.
#[derive(Debug)]
pub enum Teardown {
    Unmask(MaskSet),
    Unmount(MountHandle),
}

/// Teardowns in acquisition order; popped newest first.
#[derive(Debug, Default)]
pub struct UnwindStack {
    steps: Vec<Teardown>,
}

impl UnwindStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: Teardown) {
        self.steps.push(step);
    }

    pub fn pop(&mut self) -> Option<Teardown> {
        self.steps.pop()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::MountKind;
    use std::path::PathBuf;

    #[test]
    fn pops_in_reverse_order() {
        let mut stack = UnwindStack::new();
        stack.push(Teardown::Unmount(MountHandle {
            kind: MountKind::Volume,
            source: "DISK".to_string(),
            mountpoint: PathBuf::from("/tmp/bare.vol-DISK"),
            created_by_us: true,
            created_dir: true,
            mounted_at: None,
        }));
        stack.push(Teardown::Unmask(MaskSet::default()));
        assert_eq!(stack.len(), 2);
        assert!(matches!(stack.pop(), Some(Teardown::Unmask(_))));
        assert!(matches!(stack.pop(), Some(Teardown::Unmount(_))));
        assert!(stack.pop().is_none());
        assert!(stack.is_empty());
    }
}
