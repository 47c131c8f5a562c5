use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Answers "is the host currently online".
pub trait Connectivity: Send + Sync {
  fn is_online(&self) -> bool;
}

/// Connectivity oracle backed by a shared flag.
#[derive(Debug, Clone)]
pub struct OnlineFlag(Arc<AtomicBool>);

impl OnlineFlag {
  pub fn new(online: bool) -> Self {
    Self(Arc::new(AtomicBool::new(online)))
  }

  pub fn set_online(&self, online: bool) {
    self.0.store(online, Ordering::SeqCst);
  }
}

impl Default for OnlineFlag {
  fn default() -> Self {
    Self::new(true)
  }
}

impl Connectivity for OnlineFlag {
  fn is_online(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}
