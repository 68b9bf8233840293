use std::sync::Mutex;

use super::{Lock, Semaphore};

/// An unbuffered rendezvous channel carrying a single `i32` per transfer.
///
/// Grounded directly on the original `threads/channel.cc`: a `Receive`
/// publishes the address it wants filled, signals `sem1` to admit a
/// waiting sender, and then blocks on `sem2` until that sender has written
/// the message. `send_lock`/`receive_lock` serialize concurrent senders and
/// concurrent receivers respectively so that at most one rendezvous is in
/// flight at a time.
pub struct Channel {
    send_lock: Lock,
    receive_lock: Lock,
    slot: Mutex<i32>,
    sem1: Semaphore,
    sem2: Semaphore,
}

impl Channel {
    pub fn new() -> Self {
        Self {
            send_lock: Lock::new("channel-send"),
            receive_lock: Lock::new("channel-receive"),
            slot: Mutex::new(0),
            sem1: Semaphore::new(0),
            sem2: Semaphore::new(0),
        }
    }

    /// Blocks until a matching `receive` is ready, then hands it `message`.
    pub fn send(&self, message: i32) {
        self.send_lock.acquire(0);
        self.sem1.p();
        *self.slot.lock().unwrap() = message;
        self.sem2.v();
        self.send_lock.release();
    }

    /// Blocks until a matching `send` is ready, then returns its message.
    pub fn receive(&self) -> i32 {
        self.receive_lock.acquire(0);
        self.sem1.v();
        self.sem2.p();
        let message = *self.slot.lock().unwrap();
        self.receive_lock.release();
        message
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn single_rendezvous() {
        let chan = Arc::new(Channel::new());
        let c2 = Arc::clone(&chan);
        let sender = thread::spawn(move || c2.send(42));
        let received = chan.receive();
        sender.join().unwrap();
        assert_eq!(received, 42);
    }

    #[test]
    fn many_to_many_preserves_pairing() {
        let chan = Arc::new(Channel::new());
        let mut senders = Vec::new();
        for i in 0..8 {
            let c = Arc::clone(&chan);
            senders.push(thread::spawn(move || c.send(i)));
        }
        let mut received: Vec<i32> = (0..8).map(|_| chan.receive()).collect();
        for s in senders {
            s.join().unwrap();
        }
        received.sort();
        assert_eq!(received, (0..8).collect::<Vec<_>>());
    }
}
