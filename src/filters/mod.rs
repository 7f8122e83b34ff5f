pub mod kalman;
pub mod low_pass;
pub mod median;

pub use kalman::ScalarKalman;
pub use low_pass::LowPassFilter;
pub use median::{MedianFilter, MedianOutput, MAX_WINDOW};
