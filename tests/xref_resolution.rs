//! Cross-file reference resolution through the resource manager.

mod common;

use std::sync::Arc;
use std::time::Duration;

use scenepack::container::deflate;
use scenepack::fixture::{BufferBuilder, ObjectSpec, Value};
use scenepack::graph::{ComponentKind, SceneGraph};
use scenepack::object::Document;
use scenepack::util::{DecodeOptions, Error, FormatError, ResolverOptions, ResourceError};
use scenepack::xref::{
    content_hash, LoaderRegistry, MemorySource, ResourceKey, ResourceManager, XRef, XRefStyle, ANONYMOUS_PREFIX,
};

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];
    bytes.extend_from_slice(&13u32.to_be_bytes());
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
    bytes
}

fn manager() -> ResourceManager {
    ResourceManager::new(LoaderRegistry::with_defaults(DecodeOptions::default()), ResolverOptions::default())
}

fn manager_with(source: Arc<MemorySource>) -> ResourceManager {
    manager().with_source(source)
}

/// Document whose root field `tex` references an embedded image.
fn embedding_doc(style: XRefStyle, encoding: &str, hash: &str) -> Arc<Document> {
    let image = png(4, 2);
    let payload = match encoding {
        "deflate" => deflate(&image, 6).unwrap(),
        _ => image,
    };
    let mut b = BufferBuilder::new();
    b.xref_record("textures/wood.png", style, 0, encoding, hash, &payload);
    let root = b.object(&ObjectSpec::new("Node").field("tex", Value::xref("textures/wood.png")));
    b.set_root(root);
    common::open("embedding", b.finish())
}

fn tex_ref(doc: &Document) -> XRef {
    doc.root_object().unwrap().get("tex").and_then(|e| e.as_xref()).cloned().unwrap()
}

#[tokio::test]
async fn test_concurrent_requests_share_one_fetch() {
    let source = Arc::new(MemorySource::new().with_delay(Duration::from_millis(50)));
    source.insert("https://cdn.example.com/tex/stone.png", png(16, 8));
    let manager = Arc::new(manager_with(source.clone()));
    let xref = XRef::external("https://cdn.example.com/tex/stone.png", None);

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let manager = manager.clone();
        let xref = xref.clone();
        tasks.push(tokio::spawn(async move { manager.resolve_external(&xref).await }));
    }
    let mut payloads = Vec::new();
    for task in tasks {
        payloads.push(task.await.unwrap().unwrap());
    }

    assert_eq!(source.fetch_count(), 1);
    assert_eq!(manager.load_count(), 1);
    for p in &payloads[1..] {
        assert!(Arc::ptr_eq(p, &payloads[0]));
    }
    assert_eq!(payloads[0].as_image().unwrap().size, Some((16, 8)));

    let key = ResourceKey::External("https://cdn.example.com/tex/stone.png".into());
    assert!(manager.is_cached(&key));
    let again = manager.resolve_external(&xref).await.unwrap();
    assert!(Arc::ptr_eq(&again, &payloads[0]));
    assert_eq!(source.fetch_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_resolution_is_not_memoized() {
    let source = Arc::new(MemorySource::new().with_delay(Duration::from_millis(200)));
    source.insert("slow.png", png(1, 1));
    let manager = manager_with(source.clone());
    let xref = XRef::external("slow.png", None);

    let timed_out = tokio::time::timeout(Duration::from_millis(10), manager.resolve_external(&xref)).await;
    assert!(timed_out.is_err());
    assert!(!manager.is_cached(&ResourceKey::External("slow.png".into())));
    assert_eq!(manager.load_count(), 0);

    let payload = manager.resolve_external(&xref).await.unwrap();
    assert_eq!(payload.kind(), "image");
    assert_eq!(source.fetch_count(), 2);
    assert_eq!(manager.load_count(), 1);
}

#[tokio::test]
async fn test_failure_is_not_memoized() {
    let source = Arc::new(MemorySource::new());
    let manager = manager_with(source.clone());
    let xref = XRef::external("late.bin", None);

    let err = manager.resolve_external(&xref).await.unwrap_err();
    assert!(matches!(err, Error::Resource(ResourceError::FetchFailed { ref url, .. }) if url == "late.bin"));

    source.insert("late.bin", vec![1, 2, 3]);
    let payload = manager.resolve_external(&xref).await.unwrap();
    assert_eq!(payload.as_raw(), Some(&[1u8, 2, 3][..]));
    assert_eq!(source.fetch_count(), 2);
}

#[tokio::test]
async fn test_no_source_and_missing_loader() {
    let err = manager().resolve_external(&XRef::external("a.png", None)).await.unwrap_err();
    assert!(matches!(err, Error::Resource(ResourceError::NoSource(_))));

    let source = Arc::new(MemorySource::new());
    source.insert("model.xyz", vec![0; 4]);
    let err = manager_with(source).resolve_external(&XRef::external("model.xyz", None)).await.unwrap_err();
    assert!(matches!(err, Error::Format(FormatError::MissingLoader { ref extension, .. }) if extension == "xyz"));
}

#[tokio::test]
async fn test_internal_record_keyed_per_document() {
    let a = embedding_doc(XRefStyle::Internal, "deflate", "");
    let b = embedding_doc(XRefStyle::Internal, "deflate", "");
    let manager = manager();

    let xa = tex_ref(&a);
    assert_eq!(xa.style(), XRefStyle::Internal);
    assert_eq!(xa.record(), Some(0));
    assert_eq!(manager.key_for(Some(&a), &xa).unwrap(), ResourceKey::Internal(a.id(), "textures/wood.png".into()));

    let pa = manager.resolve(&a, &xa).await.unwrap();
    let pa2 = manager.resolve(&a, &xa).await.unwrap();
    let pb = manager.resolve(&b, &tex_ref(&b)).await.unwrap();
    assert!(Arc::ptr_eq(&pa, &pa2));
    assert!(!Arc::ptr_eq(&pa, &pb));
    assert_eq!(pa.as_image().unwrap().size, Some((4, 2)));
    assert_eq!(manager.load_count(), 2);
}

#[tokio::test]
async fn test_anonymous_records_shared_across_documents() {
    let a = embedding_doc(XRefStyle::Anonymous, "", "");
    let b = embedding_doc(XRefStyle::Anonymous, "", "");
    let manager = manager();

    let key = manager.key_for(Some(&a), &tex_ref(&a)).unwrap();
    let expected = format!("{ANONYMOUS_PREFIX}{}-0.raw/wood.png", content_hash(&png(4, 2)));
    assert_eq!(key, ResourceKey::Anonymous(expected.clone().into()));
    assert_eq!(manager.key_for(Some(&b), &tex_ref(&b)).unwrap(), key);

    let pa = manager.resolve(&a, &tex_ref(&a)).await.unwrap();
    let pb = manager.resolve(&b, &tex_ref(&b)).await.unwrap();
    assert!(Arc::ptr_eq(&pa, &pb));
    assert_eq!(manager.load_count(), 1);
    assert_eq!(manager.anonymous_names(), vec![Arc::<str>::from(expected)]);
}

#[tokio::test]
async fn test_anonymous_name_uses_record_hash() {
    let doc = embedding_doc(XRefStyle::Anonymous, "raw", "cafe01");
    let key = manager().key_for(Some(&doc), &tex_ref(&doc)).unwrap();
    assert_eq!(key, ResourceKey::Anonymous("anon/cafe01-0.raw/wood.png".into()));
}

#[tokio::test]
async fn test_decompress_limit() {
    let doc = embedding_doc(XRefStyle::Internal, "deflate", "");
    let manager = ResourceManager::new(
        LoaderRegistry::with_defaults(DecodeOptions::default()),
        ResolverOptions::default().decompress_limit(8),
    );
    let err = manager.resolve(&doc, &tex_ref(&doc)).await.unwrap_err();
    assert!(matches!(err, Error::Format(FormatError::Decompress { .. })));
}

#[tokio::test]
async fn test_embedded_reference_without_document_falls_back_to_url() {
    let doc = embedding_doc(XRefStyle::Internal, "", "");
    let xref = tex_ref(&doc);
    let source = Arc::new(MemorySource::new());
    source.insert("textures/wood.png", png(9, 9));
    let manager = manager_with(source.clone());

    assert_eq!(manager.key_for(None, &xref).unwrap(), ResourceKey::External("textures/wood.png".into()));
    let payload = manager.resolve_external(&xref).await.unwrap();
    assert_eq!(payload.as_image().unwrap().size, Some((9, 9)));
    assert_eq!(source.fetch_count(), 1);
}

fn wheel_doc() -> Vec<u8> {
    let mut b = BufferBuilder::new();
    let bolt = b.object(&ObjectSpec::node("bolt", &[], &[]));
    let hub = b.object(&ObjectSpec::node("hub", &[bolt], &[]));
    let root = b.object(&ObjectSpec::node("wheel", &[hub], &[]));
    b.set_root(root);
    b.shortcut("hub", hub);
    b.finish()
}

#[tokio::test]
async fn test_instance_of_embedded_document() {
    let mut b = BufferBuilder::new();
    b.xref_record("parts/wheel.scp", XRefStyle::Internal, 0, "", "", &wheel_doc());
    let whole = b.object(&ObjectSpec::new("Instance").field("source", Value::xref("parts/wheel.scp")));
    let part = b.object(
        &ObjectSpec::new("Instance").field("source", Value::XRef { url: "parts/wheel.scp".into(), path: Some("hub".into()) }),
    );
    let front = b.object(&ObjectSpec::node("front", &[], &[whole]));
    let spare = b.object(&ObjectSpec::node("spare", &[], &[part]));
    let root = b.object(&ObjectSpec::node("car", &[front, spare], &[]));
    b.set_root(root);
    let doc = common::open("car", b.finish());

    let manager = manager();
    let mut g = SceneGraph::new();
    let car = g.load_document(doc).unwrap();
    let front = g.child(car, "front").unwrap().unwrap();
    let spare = g.child(car, "spare").unwrap().unwrap();
    assert!(g.node(front).unwrap().component(ComponentKind::Instance).is_some());

    let wheel = g.load_instance(front, &manager).await.unwrap();
    assert_eq!(g.node(wheel).unwrap().id(), "wheel");
    assert_eq!(g.child(front, "wheel").unwrap(), Some(wheel));
    assert_eq!(g.load_instance(front, &manager).await.unwrap(), wheel);

    let hub = g.load_instance(spare, &manager).await.unwrap();
    assert_eq!(g.node(hub).unwrap().id(), "hub");
    // Same nested document, same object: one node under two parents.
    assert_eq!(g.child(wheel, "hub").unwrap(), Some(hub));
    assert_eq!(g.node(hub).unwrap().parents().len(), 2);
    assert!(g.child(hub, "bolt").unwrap().is_some());
    assert_eq!(manager.load_count(), 1);
}

#[tokio::test]
async fn test_instance_errors() {
    let source = Arc::new(MemorySource::new());
    source.insert("tex.png", png(2, 2));
    let manager = manager_with(source);

    let mut b = BufferBuilder::new();
    let not_doc = b.object(&ObjectSpec::new("Instance").field("source", Value::xref("tex.png")));
    let bad_path = b.object(
        &ObjectSpec::new("Instance").field("source", Value::XRef { url: "parts/wheel.scp".into(), path: Some("nope".into()) }),
    );
    b.xref_record("parts/wheel.scp", XRefStyle::Internal, 0, "", "", &wheel_doc());
    let n1 = b.object(&ObjectSpec::node("n1", &[], &[not_doc]));
    let n2 = b.object(&ObjectSpec::node("n2", &[], &[bad_path]));
    let root = b.object(&ObjectSpec::node("root", &[n1, n2], &[]));
    b.set_root(root);
    let doc = common::open("errors", b.finish());

    let mut g = SceneGraph::new();
    let root = g.load_document(doc).unwrap();
    let n1 = g.child(root, "n1").unwrap().unwrap();
    let n2 = g.child(root, "n2").unwrap().unwrap();

    let err = g.load_instance(n1, &manager).await.unwrap_err();
    assert!(matches!(err, Error::Format(FormatError::MalformedPayload { .. })));
    let err = g.load_instance(n2, &manager).await.unwrap_err();
    assert!(matches!(err, Error::Format(FormatError::MissingShortcut(ref p)) if p == "nope"));
    let err = g.load_instance(root, &manager).await.unwrap_err();
    assert!(matches!(err, Error::Invariant(_)));
    assert_eq!(g.node(n1).unwrap().loaded_children().count(), 0);
}
