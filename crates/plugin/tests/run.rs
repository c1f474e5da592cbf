//! End-to-end plugin runs against in-memory streams.

use protoplug::protocol::prost_types::{
    DescriptorProto, FieldDescriptorProto, FieldOptions, FileDescriptorProto,
};
use protoplug::protocol::{CodeGeneratorRequest, CodeGeneratorResponse, File};
use prost::Message;
use prost::encoding::{WireType, encode_key, encode_varint};
use protoplug::retention::{
    FileDescriptorTree, NodeKind, Retention, strip_file_descriptor_proto,
    strip_source_retention_options,
};
use protoplug::{
    CancellationToken, DescriptorOptions, Env, Error, ErrorStream, HandlerContext, HandlerError,
    Request, ResponseWriter, RunOptions, ValidationMode, Warning,
};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

fn message(name: &str) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        ..Default::default()
    }
}

fn request() -> CodeGeneratorRequest {
    CodeGeneratorRequest {
        file_to_generate: vec!["a.proto".to_string()],
        proto_file: vec![
            FileDescriptorProto {
                name: Some("b.proto".to_string()),
                message_type: vec![message("B")],
                ..Default::default()
            },
            FileDescriptorProto {
                name: Some("a.proto".to_string()),
                dependency: vec!["b.proto".to_string()],
                message_type: vec![message("A1"), message("A2")],
                ..Default::default()
            },
        ],
        ..Default::default()
    }
}

async fn list_messages(
    _ctx: HandlerContext,
    response: ResponseWriter,
    request: Arc<Request>,
) -> Result<(), HandlerError> {
    for file in request.file_descriptor_protos_to_generate(DescriptorOptions::new())? {
        let content: String = file
            .message_type
            .iter()
            .map(|m| format!("{}\n", m.name()))
            .collect();
        response.add_file(format!("{}.txt", file.name()), content)?;
    }
    Ok(())
}

async fn invoke<H: protoplug::Handler>(
    args: &[&str],
    stdin: Vec<u8>,
    handler: &H,
    options: &RunOptions,
) -> (Result<(), Error>, Vec<u8>) {
    let mut stdout = Vec::new();
    let env = Env {
        args: args.iter().map(|a| a.to_string()).collect(),
        environ: Vec::new(),
        stdin: Cursor::new(stdin),
        stdout: &mut stdout,
        stderr: ErrorStream::sink(),
    };
    let result = protoplug::run(env, handler, options, CancellationToken::new()).await;
    (result, stdout)
}

#[tokio::test]
async fn test_generates_message_list() {
    let (result, stdout) = invoke(
        &[],
        request().to_bytes(),
        &list_messages,
        &RunOptions::new(),
    )
    .await;
    result.unwrap();

    let response = CodeGeneratorResponse::from_bytes(&stdout).unwrap();
    assert_eq!(response.error, None);
    assert_eq!(response.file, vec![File::new("a.proto.txt", "A1\nA2\n")]);
}

#[tokio::test]
async fn test_version_flag() {
    let options = RunOptions::new().with_version("0.0.1");
    let (result, stdout) = invoke(&["--version"], Vec::new(), &list_messages, &options).await;
    result.unwrap();
    assert_eq!(stdout, b"0.0.1\n");

    let (result, stdout) =
        invoke(&["--version"], Vec::new(), &list_messages, &RunOptions::new()).await;
    assert!(matches!(result, Err(Error::UnknownArguments(_))));
    assert_eq!(
        result.unwrap_err().to_string(),
        "unknown argument: --version"
    );
    assert!(stdout.is_empty());
}

#[tokio::test]
async fn test_malformed_stdin() {
    let (result, stdout) =
        invoke(&[], vec![0x0a, 0x05], &list_messages, &RunOptions::new()).await;
    assert!(matches!(result, Err(Error::Protocol(_))));
    assert!(stdout.is_empty());
}

#[tokio::test]
async fn test_streamed_fragments_merge() {
    let handler = |_ctx: HandlerContext, response: ResponseWriter, _request: Arc<Request>| async move {
        // Fragments with empty names continue the previous file.
        let streamed = CodeGeneratorResponse {
            file: vec![
                File::new("out.txt", "head\n"),
                File::continuation("tail\n"),
            ],
            ..Default::default()
        };
        let merged =
            protoplug::normalize_response(streamed, ValidationMode::Strict, &|_: &Warning| {})?;
        response.add_code_generator_response_files(merged.file)?;
        Ok::<(), HandlerError>(())
    };
    let (result, stdout) = invoke(&[], request().to_bytes(), &handler, &RunOptions::new()).await;
    result.unwrap();

    let response = CodeGeneratorResponse::from_bytes(&stdout).unwrap();
    assert_eq!(response.file, vec![File::new("out.txt", "head\ntail\n")]);
}

#[tokio::test]
async fn test_custom_warning_handler_sees_duplicates() {
    let warnings = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&warnings);
    let options = RunOptions::new()
        .with_validation_mode(ValidationMode::Lenient)
        .with_warning_handler(move |w| sink.lock().unwrap().push(w.to_string()));

    let handler = |_ctx: HandlerContext, response: ResponseWriter, _request: Arc<Request>| async move {
        response.add_file("out.txt", "first")?;
        response.add_file("out.txt", "second")?;
        Ok::<(), HandlerError>(())
    };
    let (result, stdout) = invoke(&[], request().to_bytes(), &handler, &options).await;
    result.unwrap();

    let response = CodeGeneratorResponse::from_bytes(&stdout).unwrap();
    assert_eq!(response.file, vec![File::new("out.txt", "first")]);
    let warnings = warnings.lock().unwrap();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].starts_with("duplicate generated file name \"out.txt\"."));
}

#[tokio::test]
async fn test_source_retention_descriptors() {
    let mut raw = request();
    let mut source = raw.proto_file[1].clone();
    source.message_type[0].field = vec![FieldDescriptorProto {
        name: Some("id".to_string()),
        number: Some(1),
        options: Some(FieldOptions {
            deprecated: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }];
    raw.source_file_descriptors = vec![source];

    let handler = |_ctx: HandlerContext, response: ResponseWriter, request: Arc<Request>| async move {
        let options = DescriptorOptions::new().with_source_retention_options();
        for file in request.file_descriptor_protos_to_generate(options)? {
            let deprecated_is_source = |kind: NodeKind, number: i32| match (kind, number) {
                (NodeKind::Field, 3) => Retention::Source,
                _ => Retention::Runtime,
            };
            let stripped = strip_file_descriptor_proto(file.clone(), &deprecated_is_source)?;
            let field = &stripped.message_type[0].field[0];
            response.add_file(
                format!("{}.txt", file.name()),
                format!("{} options={}", field.name(), field.options.is_some()),
            )?;
        }
        Ok::<(), HandlerError>(())
    };
    let (result, stdout) = invoke(&[], raw.to_bytes(), &handler, &RunOptions::new()).await;
    result.unwrap();

    let response = CodeGeneratorResponse::from_bytes(&stdout).unwrap();
    assert_eq!(response.file, vec![File::new("a.proto.txt", "id options=false")]);
}

fn push_message(tag: u32, value: &[u8], buf: &mut Vec<u8>) {
    encode_key(tag, WireType::LengthDelimited, buf);
    encode_varint(value.len() as u64, buf);
    buf.extend_from_slice(value);
}

/// `opts.proto` declaring `(opts.internal)` (50000, source retention) and
/// `(opts.wire)` (50001, runtime retention) on field options.
fn options_file() -> Vec<u8> {
    let mut file = FileDescriptorProto {
        name: Some("opts.proto".to_string()),
        package: Some("opts".to_string()),
        ..Default::default()
    }
    .encode_to_vec();
    for (name, number, retention) in [("internal", 50000, 2), ("wire", 50001, 1)] {
        let mut extension = FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            extendee: Some(".google.protobuf.FieldOptions".to_string()),
            ..Default::default()
        }
        .encode_to_vec();
        let mut options = Vec::new();
        encode_key(17, WireType::Varint, &mut options);
        encode_varint(retention, &mut options);
        push_message(8, &options, &mut extension);
        push_message(7, &extension, &mut file);
    }
    file
}

/// `a.proto` with message `A1` and field `id`, whose options carry the
/// given extension fields.
fn target_file(extensions: &[(u32, u64)]) -> Vec<u8> {
    let mut options = Vec::new();
    for &(number, value) in extensions {
        encode_key(number, WireType::Varint, &mut options);
        encode_varint(value, &mut options);
    }
    let mut field = FieldDescriptorProto {
        name: Some("id".to_string()),
        number: Some(1),
        ..Default::default()
    }
    .encode_to_vec();
    push_message(8, &options, &mut field);
    let mut message = message("A1").encode_to_vec();
    push_message(2, &field, &mut message);
    let mut file = FileDescriptorProto {
        name: Some("a.proto".to_string()),
        dependency: vec!["opts.proto".to_string()],
        ..Default::default()
    }
    .encode_to_vec();
    push_message(4, &message, &mut file);
    file
}

#[tokio::test]
async fn test_custom_source_option_stripped() {
    let mut stdin = CodeGeneratorRequest {
        file_to_generate: vec!["a.proto".to_string()],
        ..Default::default()
    }
    .to_bytes();
    push_message(15, &options_file(), &mut stdin);
    push_message(15, &target_file(&[(50001, 3)]), &mut stdin);
    push_message(17, &target_file(&[(50000, 1), (50001, 3)]), &mut stdin);

    let handler = |_ctx: HandlerContext, response: ResponseWriter, request: Arc<Request>| async move {
        let numbers = |tree: &FileDescriptorTree| -> Vec<i32> {
            let field = &tree.root().children(4)[0].children(2)[0];
            field
                .options()
                .map(|options| options.fields().iter().map(|f| f.number()).collect())
                .unwrap_or_default()
        };
        let options = DescriptorOptions::new().with_source_retention_options();
        let source = request
            .file_descriptor_tree("a.proto", options)?
            .ok_or("a.proto missing")?;
        let stripped = strip_source_retention_options(&source);
        let runtime = request
            .file_descriptor_tree("a.proto", DescriptorOptions::new())?
            .ok_or("a.proto missing")?;

        response.add_file(
            "a.proto.txt",
            format!(
                "{:?} {:?} {:?} {}",
                numbers(&source),
                numbers(&stripped),
                numbers(&runtime),
                stripped.to_bytes() == runtime.to_bytes(),
            ),
        )?;
        Ok::<(), HandlerError>(())
    };
    let (result, stdout) = invoke(&[], stdin, &handler, &RunOptions::new()).await;
    result.unwrap();

    let response = CodeGeneratorResponse::from_bytes(&stdout).unwrap();
    assert_eq!(
        response.file,
        vec![File::new("a.proto.txt", "[50000, 50001] [50001] [50001] true")]
    );
}
