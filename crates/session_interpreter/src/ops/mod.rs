pub mod activation;
pub mod binary;
pub mod constant;
pub mod conv;
pub mod gather;
pub mod gru;
pub mod lstm;
pub mod matmul;
pub mod normalization;
pub mod recurrent;
pub mod reduce;
pub mod rnn;
pub mod shape;
pub mod slice;
pub mod squeeze;
pub mod unary;
