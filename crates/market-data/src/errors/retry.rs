/// Classification for retry policy.
///
/// Used by the router to decide whether a failed attempt should move on to
/// another candidate provider.
///
/// | Class | Try Next Provider? | Penalize Provider Score? |
/// |-------|-------------------|--------------------------|
/// | `Never` | No | No |
/// | `NextProvider` | Yes | Yes |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Never retry - the query itself is invalid or routing is exhausted.
    Never,

    /// Record a failure against the provider and try the next candidate.
    NextProvider,
}
