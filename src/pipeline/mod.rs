pub mod batch;
pub mod enrich;
pub mod extract;
pub mod form;
pub mod mapper;
pub mod output;
pub mod store;
pub mod text_source;
#[cfg(test)]
mod tests;

pub use batch::{BatchReport, BatchRunner, OutputSink};
pub use enrich::{LookupTable, RecordEnricher};
pub use extract::FieldExtractor;
pub use form::FormStateSink;
pub use mapper::FormMapper;
pub use output::{ExportSink, FormFillSink, StoreSink};
pub use store::CardStore;
pub use text_source::{PdftotextSource, PlainTextSource, TextSource};
