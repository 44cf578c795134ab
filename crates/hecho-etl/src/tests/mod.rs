//! Loader tests against in-memory stores and a scripted source.

mod warehouse;
