use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::texture::UniqueKey;

/// Posted to a store's invalidation channel when the pixel contents behind
/// a cached texture have been mutated. The store drops the keyed entry the
/// next time it drains the channel.
#[derive(Debug)]
pub struct UniqueKeyInvalidated {
    pub key: UniqueKey,
}

pub type InvalidationSender = Sender<UniqueKeyInvalidated>;
pub type InvalidationReceiver = Receiver<UniqueKeyInvalidated>;

pub(crate) fn invalidation_channel() -> (InvalidationSender, InvalidationReceiver) {
    unbounded()
}
