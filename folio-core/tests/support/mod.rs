// Each test binary pulls in its own copy and uses a different subset.
#![allow(dead_code)]

pub mod circulation;
