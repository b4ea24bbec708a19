use heapless::{String as HString, Vec as HVec};
use libprehub::network::error::Error;
use libprehub::network::pubsub::{Message, Transport};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Everything a mock session saw, shared with the test after the agent has
/// taken ownership of the transport.
#[derive(Debug, Default)]
pub struct Log {
    pub published: Vec<(String, Vec<u8>)>,
    pub subscribed: Vec<String>,
    pub unsubscribed: Vec<String>,
    pub inbox: VecDeque<Message>,
    pub pings: usize,
    pub closed: bool,
    pub fail_subscribe_on: Option<&'static str>,
    pub fail_publish: bool,
    pub fail_poll: Option<Error>,
}

impl Log {
    pub fn published_on(&self, topic: &str) -> Vec<Vec<u8>> {
        self.published
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn deliver(&mut self, topic: &str, payload: &[u8]) {
        self.inbox.push_back(Message {
            topic: HString::try_from(topic).unwrap(),
            payload: HVec::from_slice(payload).unwrap(),
        });
    }
}

#[derive(Debug)]
pub struct MockTransport {
    log: Rc<RefCell<Log>>,
}

impl MockTransport {
    pub fn new() -> (Self, Rc<RefCell<Log>>) {
        let log = Rc::new(RefCell::new(Log::default()));
        (Self { log: log.clone() }, log)
    }
}

impl Transport for MockTransport {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Error> {
        let mut log = self.log.borrow_mut();
        if log.closed {
            return Err(Error::NotOpen);
        }
        if log.fail_publish {
            return Err(Error::WriteError);
        }
        log.published.push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), Error> {
        let mut log = self.log.borrow_mut();
        if let Some(suffix) = log.fail_subscribe_on {
            if topic.ends_with(suffix) {
                return Err(Error::ConnectionRefused);
            }
        }
        log.subscribed.push(topic.to_string());
        Ok(())
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), Error> {
        self.log.borrow_mut().unsubscribed.push(topic.to_string());
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<Message>, Error> {
        let mut log = self.log.borrow_mut();
        if let Some(err) = log.fail_poll.take() {
            return Err(err);
        }
        Ok(log.inbox.pop_front())
    }

    fn ping(&mut self) -> Result<(), Error> {
        self.log.borrow_mut().pings += 1;
        Ok(())
    }

    fn disconnect(self) -> Result<(), Error> {
        self.log.borrow_mut().closed = true;
        Ok(())
    }
}
