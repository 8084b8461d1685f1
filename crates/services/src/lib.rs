#![forbid(unsafe_code)]

pub mod course_service;
pub mod error;
pub mod progress_engine;

pub use course_core::Clock;

pub use course_service::{CourseService, LoadedCourse};
pub use error::{CourseServiceError, EngineError};
pub use progress_engine::{
    CourseOverview, ProgressEngine, ProgressEvent, UpdatedProgress,
};
