// Rule extractors, one per source format. Both hand their output to the
// normalizer so records from either source are interchangeable.

pub mod tabular;
pub mod text;

pub use tabular::TabularRuleExtractor;
pub use text::{BlockScanner, BlockState, TextRuleExtractor};
