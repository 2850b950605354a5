/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Lex,
    Parse,
    DetectVm,
    FindEncryption,
    Decrypt,
    StripAntidecompile,
    Optimize,
    Emit,
}

impl Step {
    /// The wire name reported to progress sinks.
    pub fn name(self) -> &'static str {
        match self {
            Step::Lex => "lex",
            Step::Parse => "parse",
            Step::DetectVm => "detect_vm",
            Step::FindEncryption => "find_encryption",
            Step::Decrypt => "decrypt",
            Step::StripAntidecompile => "strip_antidecompile",
            Step::Optimize => "optimize",
            Step::Emit => "emit",
        }
    }

    /// Overall completion after this stage finishes.
    pub fn fraction(self) -> f64 {
        match self {
            Step::Lex => 0.10,
            Step::Parse => 0.25,
            Step::DetectVm => 0.40,
            Step::FindEncryption => 0.50,
            Step::Decrypt => 0.65,
            Step::StripAntidecompile => 0.75,
            Step::Optimize => 0.85,
            Step::Emit => 1.0,
        }
    }
}

/// A stage-boundary progress report. Fractions are monotonic over one
/// invocation; the sink runs synchronously on the computing thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub step: &'static str,
    pub fraction: f64,
}

impl ProgressEvent {
    pub(crate) fn at(step: Step) -> Self {
        Self {
            step: step.name(),
            fraction: step.fraction(),
        }
    }
}
