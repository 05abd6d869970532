/*!
Observable value cells with cancellable async waits.

A [`Store`] holds a single value. Writing a different value notifies every pending wait
synchronously; writing an equal value does nothing. On top of that:

- [`ReadonlyStore::wait`] / [`ReadonlyStore::wait_map`] resolve once a condition holds, or fail with
  [`Cancelled`] when the cancellation token fires first
- [`derive`] builds a read-only, memoized view of a cell through a pure transform
- [`watch`] turns a cell into a stream of its distinct values

Cancellation goes through the [`Cancellation`] trait so any token that can report, register and
deregister a "cancelled" callback works. [`CancelToken`] is the implementation shipped here.

# Design requirements:
- Writers and readers are different types ([`Store`] and [`ReadStore`])
- Notification is synchronous; listeners run before `set` returns
- Listeners are only ever registered by pending waits and removed exactly once
- Values are compared with `PartialEq`, both for the write gate and for derived memoization

# Basic usage

```rust
use reactive_store::*;

# tokio_test::block_on(async {
let count = Store::new(0);
let token = CancelToken::new();

let reached = count.wait(&token, |n| *n >= 2);
count.set(1);
count.set(2);
assert_eq!(reached.await, Ok(2));

let doubled = count.read().derive(|n| n * 2);
assert_eq!(doubled.value(), 4);
# });
```

# Watching

```rust
use futures::StreamExt;
use reactive_store::*;

# tokio_test::block_on(async {
let status = Store::new("idle");
let token = CancelToken::new();
let mut changes = Box::pin(watch(token.clone(), status.read()));

assert_eq!(changes.next().await, Some(Ok("idle")));
status.set("busy");
assert_eq!(changes.next().await, Some(Ok("busy")));

token.cancel();
assert_eq!(changes.next().await, Some(Err(Cancelled)));
assert_eq!(changes.next().await, None);
# });
```
*/

mod broadcast;
mod cancel;
mod derived;
mod error;
mod store;
mod traits;
mod value;
mod wait;
mod watch;

pub use cancel::*;
pub use derived::*;
pub use error::*;
pub use store::*;
pub use traits::*;
pub use wait::WaitFuture;
pub use watch::*;
