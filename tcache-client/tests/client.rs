use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use tcache_client::{CacheClient, ClientConfig, DeleteResult, StoreResult};

/// Spawns a fake server on an ephemeral port that hands each received
/// command line, the shared buffered reader (so a handler can read a
/// payload without losing bytes the `BufReader` already pulled off the
/// socket), and the raw stream (for writing the reply) to `handler`.
fn spawn_server(
    expected_commands: usize,
    handler: fn(usize, Vec<u8>, &mut BufReader<TcpStream>, &mut TcpStream),
) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
        let mut reader = BufReader::new(stream.try_clone().expect("clone"));
        for idx in 0..expected_commands {
            let mut line = Vec::new();
            reader.read_until(b'\n', &mut line).expect("read line");
            handler(idx, line, &mut reader, &mut stream);
        }
    });

    addr
}

fn client_with_addr(addr: String) -> CacheClient {
    let config = ClientConfig {
        addr,
        max_idle: 1,
        max_total: 1,
        read_timeout: Some(Duration::from_secs(1)),
        write_timeout: Some(Duration::from_secs(1)),
        connect_timeout: Some(Duration::from_secs(1)),
    };
    CacheClient::with_config(config).expect("client")
}

#[test]
fn client_set_get_roundtrip() {
    let addr = spawn_server(2, |idx, line, reader, stream| {
        if idx == 0 {
            assert_eq!(line, b"set key 0 0 5\r\n");
            let mut body = [0u8; 7];
            reader.read_exact(&mut body).expect("read payload");
            assert_eq!(&body, b"value\r\n");
            stream.write_all(b"STORED\r\n").unwrap();
        } else {
            assert_eq!(line, b"get key\r\n");
            stream.write_all(b"VALUE key 0 5\r\nvalue\r\nEND\r\n").unwrap();
        }
    });

    let client = client_with_addr(addr);
    client.set(b"key", 0, 0, b"value").expect("set");
    let value = client.get(b"key").expect("get").expect("hit");
    assert_eq!(value.data, b"value");
    assert_eq!(value.flags, 0);
}

#[test]
fn client_add_reports_not_stored() {
    let addr = spawn_server(1, |_, line, _reader, stream| {
        assert_eq!(line, b"add key 0 0 1\r\n");
        stream.write_all(b"NOT_STORED\r\n").unwrap();
    });

    let client = client_with_addr(addr);
    // The fake server discards the payload implicitly (it never reads it,
    // but the client still writes it in one `send` call).
    let outcome = client.add(b"key", 0, 0, b"x").expect("add");
    assert_eq!(outcome, StoreResult::NotStored);
}

#[test]
fn client_incr_and_delete() {
    let addr = spawn_server(2, |idx, line, _reader, stream| {
        if idx == 0 {
            assert_eq!(line, b"incr n 3\r\n");
            stream.write_all(b"13\r\n").unwrap();
        } else {
            assert_eq!(line, b"delete n\r\n");
            stream.write_all(b"DELETED\r\n").unwrap();
        }
    });

    let client = client_with_addr(addr);
    let value = client.incr(b"n", 3).expect("incr");
    assert_eq!(value, Some(13));
    let removed = client.delete(b"n", None).expect("delete");
    assert_eq!(removed, DeleteResult::Deleted);
}

#[test]
fn client_get_many_skips_misses() {
    let addr = spawn_server(1, |_, line, _reader, stream| {
        assert_eq!(line, b"get a b c\r\n");
        stream.write_all(b"VALUE a 0 1\r\n1\r\nVALUE c 0 1\r\n3\r\nEND\r\n").unwrap();
    });

    let client = client_with_addr(addr);
    let values = client.get_many(&[b"a", b"b", b"c"]).expect("get_many");
    assert_eq!(values.len(), 2);
    assert_eq!(values[0].0, b"a");
    assert_eq!(values[1].0, b"c");
}

#[test]
fn client_version_and_stats() {
    let addr = spawn_server(2, |idx, line, _reader, stream| {
        if idx == 0 {
            assert_eq!(line, b"version\r\n");
            stream.write_all(b"VERSION 1.0.0\r\n").unwrap();
        } else {
            assert_eq!(line, b"stats\r\n");
            stream.write_all(b"STAT pid 42\r\nEND\r\n").unwrap();
        }
    });

    let client = client_with_addr(addr);
    assert_eq!(client.version().expect("version"), b"1.0.0");
    let stats = client.stats().expect("stats");
    assert_eq!(stats, vec![(b"pid".to_vec(), b"42".to_vec())]);
}
