#![deny(unsafe_op_in_unsafe_fn)]

mod backend;
mod binding;
mod cache;
mod compute;
mod descriptor;
mod error;
mod hash;
mod id;
mod instance;
mod layout;
mod pipeline;
mod reflection;
mod shader;
mod state;

pub use backend::*;
pub use binding::*;
pub use cache::*;
pub use compute::*;
pub use descriptor::*;
pub use error::*;
pub use hash::*;
pub use id::*;
pub use instance::*;
pub use layout::*;
pub use pipeline::*;
pub use reflection::*;
pub use shader::*;
pub use state::*;

pub use naga;
pub use wgpu;
