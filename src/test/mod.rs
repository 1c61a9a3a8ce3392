//! Test module

mod test_link;
mod test_lsdb;
mod test_network;
