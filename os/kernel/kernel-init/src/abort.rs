use crate::error::{InitStage, SystemFailure};

/// Something that can stop the processor for good.
pub trait Halt {
    fn halt_forever(&self) -> !;
}

/// The decision to stop. Unlike an error it cannot be handled, only carried
/// out with [`halt`](Abort::halt).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[must_use]
pub struct Abort {
    stage: InitStage,
}

impl Abort {
    pub const fn new(stage: InitStage) -> Self {
        Self { stage }
    }

    /// The stage that could not complete.
    #[must_use]
    pub const fn stage(&self) -> InitStage {
        self.stage
    }

    pub fn halt<H: Halt + ?Sized>(self, cpu: &H) -> ! {
        log::trace!("halting after failed {} stage", self.stage);
        cpu.halt_forever()
    }
}

impl From<&SystemFailure> for Abort {
    fn from(failure: &SystemFailure) -> Self {
        Self::new(failure.stage)
    }
}
