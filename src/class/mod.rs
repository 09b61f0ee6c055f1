use crate::messaging::Handler;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub mod inbox;
use self::inbox::Inbox;

/// Handler of one actor, shared so it can run while the runtime state is
/// borrowed by the handler's own sends and creates
pub type SharedHandler = Rc<RefCell<Box<dyn Handler>>>;

/// Everything a runtime knows about one actor
pub struct Class {
    pub name: String,
    pub handler: Option<SharedHandler>,
    pub inbox: Inbox,
    pub custom_data: HashMap<&'static str, Rc<dyn Any>>,
    pub terminated: bool,
}

impl Class {
    pub fn new(name: &str, handler: Box<dyn Handler>, inbox_capacity: usize) -> Self {
        Class {
            name: name.to_owned(),
            handler: Some(Rc::new(RefCell::new(handler))),
            inbox: Inbox::new(inbox_capacity),
            custom_data: HashMap::new(),
            terminated: false,
        }
    }

    /// Mark the actor as terminated and hand out everything that should be
    /// dropped once no runtime borrow is held anymore
    pub fn terminate(&mut self) -> (Option<SharedHandler>, Vec<Box<dyn Any>>) {
        self.terminated = true;
        self.custom_data.clear();
        (self.handler.take(), self.inbox.drain())
    }

    pub fn custom_data(&self, key: &'static str) -> Option<Rc<dyn Any>> {
        self.custom_data.get(key).cloned()
    }

    pub fn set_custom_data(
        &mut self,
        key: &'static str,
        value: Option<Rc<dyn Any>>,
    ) -> Option<Rc<dyn Any>> {
        match value {
            Some(value) => self.custom_data.insert(key, value),
            None => self.custom_data.remove(key),
        }
    }
}
