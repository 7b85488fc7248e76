use futures::future::{self, Either};
use std::future::Future;
use std::pin::pin;

/// Wait for whichever of two futures settles first.
///
/// The loser is dropped without being polled again. A spawned task behind a
/// dropped `JoinHandle` keeps running; its result is simply never observed.
pub async fn race<A, B>(first: A, second: B) -> Either<A::Output, B::Output>
where
  A: Future,
  B: Future,
{
  let first = pin!(first);
  let second = pin!(second);

  match future::select(first, second).await {
    Either::Left((output, _)) => Either::Left(output),
    Either::Right((output, _)) => Either::Right(output),
  }
}
