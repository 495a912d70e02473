pub mod block_coder;
pub mod convcoder;
pub mod g610;
pub mod interleave;
pub mod viterbi;
