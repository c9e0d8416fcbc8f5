//! Workspace tests, one module per crate plus end-to-end runs of
//! compiled guest code.

#[cfg(test)]
mod guest;

#[cfg(test)]
mod backend;
#[cfg(test)]
mod core;
