use crate::error::Result;
use crate::tree::HostTree;

/// Commit stages, applied in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommitPhase {
    Mutation,
    Layout,
    Passive,
}

/// A deferred, single-use unit of work. Committing consumes it.
pub trait Effect {
    fn commit(self: Box<Self>, phase: CommitPhase, host: &mut HostTree) -> Result<()>;
}

pub struct FnEffect<F>(F);

impl<F> Effect for FnEffect<F>
where
    F: FnOnce(CommitPhase, &mut HostTree) -> Result<()>,
{
    fn commit(self: Box<Self>, phase: CommitPhase, host: &mut HostTree) -> Result<()> {
        (self.0)(phase, host)
    }
}

pub fn effect_fn<F>(f: F) -> Box<dyn Effect>
where
    F: FnOnce(CommitPhase, &mut HostTree) -> Result<()> + 'static,
{
    Box::new(FnEffect(f))
}

/// Commits in order and stops at the first failure; whatever already ran
/// stays applied.
pub(crate) fn commit_all(
    effects: Vec<Box<dyn Effect>>,
    phase: CommitPhase,
    host: &mut HostTree,
) -> Result<usize> {
    let count = effects.len();
    for effect in effects {
        effect.commit(phase, host)?;
    }
    Ok(count)
}
