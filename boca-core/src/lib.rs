mod client;
mod token;

pub use client::{
    Answer, ApiErrorClass, BocaClient, BocaError, ByteStream, Contest, Problem, Run,
    RunSubmission, Verdict,
};
pub use token::{TokenClient, TokenError};
