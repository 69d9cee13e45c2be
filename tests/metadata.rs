use serde::Serialize;
use swarmget::bencode::{self, Dict, Value};
use swarmget::Metadata;

const SAMPLE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/sample.torrent");

#[test]
fn test_sample_fixture() {
    let metadata = Metadata::from_file(SAMPLE).unwrap();

    assert_eq!(metadata.info_hash_hex(), "d69f91e6b2ae4c542468d1073a71d4ea13879a7f");
    assert_eq!(metadata.tracker_url(), "http://bittorrent-test-tracker.codecrafters.io/announce");
    assert_eq!(metadata.total_length(), 92063);
    assert_eq!(metadata.piece_length(), 32768);
    assert_eq!(metadata.piece_count(), 3);
    assert_eq!(metadata.piece_size(2), Some(26527));
    assert_eq!(
        metadata.piece_hashes_hex()[0],
        "e876f67a2a8886e8f36b136726c30fa29703022d"
    );
    assert_eq!(metadata.to_bytes(), std::fs::read(SAMPLE).unwrap());
}

#[derive(Serialize)]
struct Info {
    length: i64,
    name: String,
    #[serde(rename = "piece length")]
    piece_length: i64,
    tags: Vec<String>,
}

#[test]
fn test_encoder_matches_serde_bencode() {
    let info = Info {
        length: 92063,
        name: "sample.txt".to_string(),
        piece_length: 32768,
        tags: vec!["a".to_string(), "bc".to_string()],
    };
    let reference = serde_bencode::to_bytes(&info).unwrap();

    let mut dict = Dict::new();
    dict.insert(b"tags".to_vec(), Value::List(vec![Value::from("a"), Value::from("bc")]));
    dict.insert(b"piece length".to_vec(), Value::Integer(32768));
    dict.insert(b"name".to_vec(), Value::from("sample.txt"));
    dict.insert(b"length".to_vec(), Value::Integer(92063));
    let ours = bencode::encode(&Value::Dict(dict));

    assert_eq!(ours, reference);
    assert_eq!(bencode::encode(&bencode::decode(&reference).unwrap()), reference);
}

#[test]
fn test_decode_serde_bencode_scalars() {
    let encoded = serde_bencode::to_bytes(&-42i64).unwrap();
    assert_eq!(bencode::decode(&encoded).unwrap(), Value::Integer(-42));

    let encoded = serde_bencode::to_bytes(&"hello").unwrap();
    assert_eq!(bencode::decode(&encoded).unwrap(), Value::from("hello"));
}

#[test]
fn test_metadata_round_trips_through_file() {
    let content: Vec<u8> = (0..50_000u32).map(|i| (i % 97) as u8).collect();
    let metadata = Metadata::for_content("http://tracker.test/announce", None, &content, 16384).unwrap();

    let path = std::env::temp_dir().join(format!("swarmget-{}.torrent", std::process::id()));
    std::fs::write(&path, metadata.to_bytes()).unwrap();
    let reloaded = Metadata::from_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(reloaded.info_hash(), metadata.info_hash());
    assert_eq!(reloaded.piece_count(), 4);
    assert_eq!(reloaded.piece_size(3), Some(50_000 - 3 * 16384));
    assert_eq!(reloaded.name(), None);
}
