//! Integration tests for the grid server
//!
//! These tests run the real server on an ephemeral port and talk to it over TCP.

use server::config::ServerConfig;
use server::network::Server;
use shared::{Command, Direction, Position, MAX_COMMAND_LEN};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Starts a server in a temp directory and returns it with its address
async fn start_server(threshold: usize) -> (Arc<Server>, std::net::SocketAddr, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        port: 0,
        grid_file: dir.path().join("matrix.dat"),
        snapshot_file: dir.path().join("snapshot.log"),
        session_threshold: threshold,
        ..ServerConfig::default()
    };

    let server = Arc::new(Server::new(config).await.unwrap());
    let addr = server.local_addr().unwrap();
    {
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            let _ = server.run().await;
        });
    }

    (server, addr, dir)
}

async fn read_reply(stream: &mut TcpStream, len: usize) -> String {
    let mut buf = vec![0u8; len];
    timeout(REPLY_TIMEOUT, stream.read_exact(&mut buf))
        .await
        .expect("timed out waiting for reply")
        .unwrap();
    String::from_utf8(buf).unwrap()
}

async fn wait_for_flushes(server: &Server, expected: u64) {
    let coordinator = server.coordinator();
    timeout(REPLY_TIMEOUT, async {
        while coordinator.flush_count() < expected {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("flush did not happen in time");
}

/// PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Tests a write followed by a read on the same connection
    #[tokio::test]
    async fn write_then_read_roundtrip() {
        let (_server, addr, _dir) = start_server(3).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(b"WRITE,4,2,+X,HELLO,ENDREAD,4,2,+X,END")
            .await
            .unwrap();

        assert_eq!(read_reply(&mut client, 5).await, "HELLO");
    }

    /// Tests that commands split across TCP writes are still decoded
    #[tokio::test]
    async fn fragmented_command_is_decoded() {
        let (server, addr, _dir) = start_server(3).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.set_nodelay(true).unwrap();

        let chunks: [&[u8]; 5] = [b"WRI", b"TE,7,7,-Y,UP", b",E", b"ND", b"READ,6,7,-Y,END"];
        for chunk in chunks {
            client.write_all(chunk).await.unwrap();
            sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(read_reply(&mut client, 1).await, "P");
        assert_eq!(
            server
                .store()
                .read(Position::new(7, 7), Direction::DecreasingY)
                .unwrap(),
            "UP"
        );
    }

    /// Tests that invalid commands are ignored without closing the connection
    #[tokio::test]
    async fn invalid_commands_are_ignored() {
        let (_server, addr, _dir) = start_server(3).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(b"WRITE,28,28,+X,HELLO,ENDWRITE,-1,0,+X,NO,ENDREAD,0,0,?,ENDHELLO,END")
            .await
            .unwrap();
        client
            .write_all(b"WRITE,0,0,+Y,ALIVE,ENDREAD,0,0,+Y,END")
            .await
            .unwrap();

        assert_eq!(read_reply(&mut client, 5).await, "ALIVE");
    }

    /// Tests that a READ of an empty cell sends nothing back
    #[tokio::test]
    async fn empty_read_sends_no_bytes() {
        let (_server, addr, _dir) = start_server(3).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(b"READ,10,10,+X,ENDWRITE,1,1,+X,Z,ENDREAD,1,1,+X,END")
            .await
            .unwrap();

        // The first byte on the wire is the second READ's reply
        assert_eq!(read_reply(&mut client, 1).await, "Z");
    }

    /// Tests that a client streaming bytes without a sentinel is disconnected
    #[tokio::test]
    async fn unterminated_flood_is_disconnected() {
        let (server, addr, _dir) = start_server(3).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        let _ = client.write_all(&[b'A'; 4 * MAX_COMMAND_LEN]).await;

        let mut buf = [0u8; 16];
        let read = timeout(REPLY_TIMEOUT, client.read(&mut buf))
            .await
            .expect("connection was not closed");
        assert!(matches!(read, Ok(0) | Err(_)));

        let coordinator = server.coordinator();
        timeout(REPLY_TIMEOUT, async {
            while coordinator.completed_sessions().await < 1 {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session was not counted");
    }
}

/// MULTI-CLIENT TESTS
mod multi_client_tests {
    use super::*;

    /// Tests that a write from one session is visible to another
    #[tokio::test]
    async fn writes_visible_across_sessions() {
        let (_server, addr, _dir) = start_server(10).await;
        let mut writer = TcpStream::connect(addr).await.unwrap();
        let mut reader = TcpStream::connect(addr).await.unwrap();

        let write = Command::Write {
            origin: Position::new(12, 3),
            direction: Direction::IncreasingX,
            word: "SHARED".to_string(),
        };
        writer.write_all(write.encode().as_bytes()).await.unwrap();

        // A READ on the writer's own connection orders us after the write
        let read = Command::Read {
            origin: Position::new(12, 3),
            direction: Direction::IncreasingX,
        };
        writer.write_all(read.encode().as_bytes()).await.unwrap();
        assert_eq!(read_reply(&mut writer, 6).await, "SHARED");

        reader.write_all(read.encode().as_bytes()).await.unwrap();
        assert_eq!(read_reply(&mut reader, 6).await, "SHARED");
    }

    /// Tests many clients writing disjoint rows concurrently
    #[tokio::test]
    async fn concurrent_clients_disjoint_rows() {
        let (server, addr, _dir) = start_server(100).await;

        let handles: Vec<_> = (0..10)
            .map(|row| {
                tokio::spawn(async move {
                    let mut client = TcpStream::connect(addr).await.unwrap();
                    let word = format!("ROW{}", row);
                    let command = Command::Write {
                        origin: Position::new(row, 0),
                        direction: Direction::IncreasingX,
                        word: word.clone(),
                    };
                    let read = Command::Read {
                        origin: Position::new(row, 0),
                        direction: Direction::IncreasingX,
                    };
                    client
                        .write_all(format!("{}{}", command.encode(), read.encode()).as_bytes())
                        .await
                        .unwrap();
                    assert_eq!(read_reply(&mut client, word.len()).await, word);
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = server.store().snapshot().unwrap();
        for row in 0..10 {
            assert_eq!(&snapshot.row(row)[..3], b"ROW");
        }
    }
}

/// THRESHOLD FLUSH TESTS
mod flush_tests {
    use super::*;

    /// Tests that reaching the session threshold exports and renews the grid
    #[tokio::test]
    async fn threshold_flush_exports_and_renews() {
        let (server, addr, dir) = start_server(2).await;

        for (col, letter) in [(0, "A"), (5, "B")] {
            let mut client = TcpStream::connect(addr).await.unwrap();
            let command = Command::Write {
                origin: Position::new(0, col),
                direction: Direction::IncreasingX,
                word: letter.to_string(),
            };
            client.write_all(command.encode().as_bytes()).await.unwrap();
            client.shutdown().await.unwrap();
            // Make sure the server has read everything before the next session
            let mut rest = Vec::new();
            timeout(REPLY_TIMEOUT, client.read_to_end(&mut rest))
                .await
                .unwrap()
                .unwrap();
        }

        wait_for_flushes(&server, 1).await;

        let content = std::fs::read_to_string(dir.path().join("snapshot.log")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 30);
        assert_eq!(lines[0], "(0,0):A (0,5):B");
        assert!(lines[1..].iter().all(|line| line.is_empty()));

        assert!(server.store().snapshot().unwrap().is_empty());
        assert_eq!(server.coordinator().completed_sessions().await, 0);
    }

    /// Tests that a session after the flush starts a new cycle
    #[tokio::test]
    async fn flush_happens_once_per_cycle() {
        let (server, addr, _dir) = start_server(2).await;

        for _ in 0..3 {
            let client = TcpStream::connect(addr).await.unwrap();
            drop(client);
        }

        wait_for_flushes(&server, 1).await;
        timeout(REPLY_TIMEOUT, async {
            while server.coordinator().completed_sessions().await != 1 {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("third session was not counted");
        assert_eq!(server.coordinator().flush_count(), 1);
    }
}
