//! protoc-gen-names - A minimal protobuf compiler plugin.
//!
//! For every file to generate, writes `<file>.txt` listing the file's
//! top-level message names, one per line.
//!
//! ```text
//! protoc --plugin=protoc-gen-names --names_out=out a.proto
//! ```

use protoplug::{
    DescriptorOptions, HandlerContext, HandlerError, Request, ResponseWriter, RunOptions,
};
use std::fmt::Write;
use std::process::ExitCode;
use std::sync::Arc;

async fn generate(
    ctx: HandlerContext,
    response: ResponseWriter,
    request: Arc<Request>,
) -> Result<(), HandlerError> {
    response.set_feature_proto3_optional()?;

    for file in request.file_descriptor_protos_to_generate(DescriptorOptions::new())? {
        if ctx.is_cancelled() {
            return Err("interrupted".into());
        }

        let mut content = String::new();
        for message in &file.message_type {
            writeln!(content, "{}", message.name())?;
        }

        tracing::debug!(
            file = file.name(),
            messages = file.message_type.len(),
            "Listed message names"
        );
        response.add_file(format!("{}.txt", file.name()), content)?;
    }

    Ok(())
}

fn main() -> ExitCode {
    protoplug::main(
        generate,
        RunOptions::new().with_version(env!("CARGO_PKG_VERSION")),
    )
}
