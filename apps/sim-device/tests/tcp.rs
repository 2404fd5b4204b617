// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Drive the TCP line server with raw JSON frames and config files.
// Author: Lukas Bower

use std::io::Write as _;

use sim_device::{build_device, AddressSpace, DeviceConfig, DeviceServer};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use uasim_proto::frame::{Request, RequestBody, Response, ResponseBody};
use uasim_proto::{NodeRef, ServiceError, Value};

async fn start_server(config: &DeviceConfig) -> (std::net::SocketAddr, CancellationToken, NodeRef) {
    let mut space = AddressSpace::new();
    let layout = build_device(&mut space, config).expect("build device");
    let server = DeviceServer::new(space.into_shared());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("local addr");
    let cancel = CancellationToken::new();
    tokio::spawn(sim_device::tcp::serve(listener, server, cancel.clone()));
    (address, cancel, layout.device)
}

async fn exchange(
    lines: &mut tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>,
    writer: &mut tokio::net::tcp::OwnedWriteHalf,
    request: &Request,
) -> Response {
    let mut line = serde_json::to_string(request).expect("encode");
    line.push('\n');
    writer.write_all(line.as_bytes()).await.expect("send");
    let reply = lines.next_line().await.expect("read").expect("reply line");
    serde_json::from_str(&reply).expect("decode")
}

#[tokio::test]
async fn frames_round_trip_over_tcp() {
    let (address, cancel, device) = start_server(&DeviceConfig::default()).await;
    let stream = TcpStream::connect(address).await.expect("connect");
    let (read_half, mut writer) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let response = exchange(
        &mut lines,
        &mut writer,
        &Request {
            tag: 41,
            body: RequestBody::BrowseChildren {
                node: NodeRef::objects_folder(),
            },
        },
    )
    .await;
    assert_eq!(response.tag, 41);
    assert_eq!(
        response.body,
        ResponseBody::BrowseChildren {
            children: vec![device.clone()]
        }
    );

    let response = exchange(
        &mut lines,
        &mut writer,
        &Request {
            tag: 42,
            body: RequestBody::ReadValue { node: device.clone() },
        },
    )
    .await;
    assert_eq!(response.tag, 42);
    assert_eq!(
        response.body,
        ResponseBody::Error {
            error: ServiceError::NotAVariable(device)
        }
    );
    cancel.cancel();
}

#[tokio::test]
async fn malformed_line_closes_the_connection() {
    let (address, cancel, _) = start_server(&DeviceConfig::default()).await;
    let stream = TcpStream::connect(address).await.expect("connect");
    let (read_half, mut writer) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    writer.write_all(b"{\"tag\": \"nope\"}\n").await.expect("send");
    assert!(lines.next_line().await.expect("read").is_none());
    cancel.cancel();
}

#[tokio::test]
async fn config_file_drives_the_served_layout() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(
        file,
        r#"
        namespace_uri = "urn:plant:boiler"
        tick_ms = 250

        [device]
        name = "Boiler"

        [[device.variables]]
        name = "Setpoint"
        initial = {{ type = "Float", value = 70.5 }}
        writable = true
        "#
    )
    .expect("write config");
    let config = DeviceConfig::load(file.path()).expect("load config");
    let (address, cancel, device) = start_server(&config).await;

    let stream = TcpStream::connect(address).await.expect("connect");
    let (read_half, mut writer) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let response = exchange(
        &mut lines,
        &mut writer,
        &Request {
            tag: 1,
            body: RequestBody::ResolveNamespace {
                uri: "urn:plant:boiler".to_owned(),
            },
        },
    )
    .await;
    assert_eq!(response.body, ResponseBody::ResolveNamespace { index: 1 });

    let response = exchange(
        &mut lines,
        &mut writer,
        &Request {
            tag: 2,
            body: RequestBody::BrowseChildren { node: device },
        },
    )
    .await;
    let ResponseBody::BrowseChildren { children } = response.body else {
        panic!("unexpected reply {:?}", response.body);
    };
    let response = exchange(
        &mut lines,
        &mut writer,
        &Request {
            tag: 3,
            body: RequestBody::ReadValue {
                node: children[0].clone(),
            },
        },
    )
    .await;
    assert_eq!(
        response.body,
        ResponseBody::ReadValue {
            value: Value::Float(70.5)
        }
    );
    cancel.cancel();
}
