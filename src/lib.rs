pub mod cli;
pub mod config;
pub mod extract;
pub mod merge;
pub mod normalize;
pub mod ocr;
pub mod oracle;
pub mod organize;
pub mod pipeline;
pub mod report;
pub mod taxonomy;
pub mod util;
pub mod window;
