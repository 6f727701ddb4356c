/*!
Foundational reactive plumbing for the `ripple` entity cache.

Two small, independent pieces:

- [`bus`]: a typed event bus whose dispatch is always deferred to the next
  runtime tick, so observers never run inside a half-finished state
  transition, and whose `emit` is capability-gated so only the owning
  component can publish.
- [`weak_index`]: a map that holds its values weakly, used to deduplicate
  item and collection queries without pinning them in memory forever.
*/

mod bus;
mod weak_index;

pub use bus::{Bus, BusError, Owner, Subscription};
pub use weak_index::{WeakIndex, WeakIndexEvent};
