// src/os/mod.rs

//! Thin wrappers over Linux facilities: fbdev ioctls, epoll, signalfd and
//! the wake pipe.

pub mod epoll;
pub mod fbdev;
pub mod signals;
pub mod wake;
