use std::future::Future;

/// Blocks the current thread until `future` resolves.
///
/// Used for the blocking half of backends whose native primitive
/// only supports posting.
pub(crate) fn block_on<F>(future: F) -> F::Output
where
    F: Future,
{
    beul::execute(future)
}
