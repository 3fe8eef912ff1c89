//! DHCP server handing out leases to access point clients

use core::net::Ipv4Addr;

use edge_dhcp::server::{Server, ServerOptions};
use edge_dhcp::{Options, Packet};
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{Ipv4Address, Stack};
use embassy_time::{Duration, Timer};
use log::{error, info, warn};

pub const AP_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);

const LEASES: usize = 8;
const PACKET_BUF: usize = 600;

pub async fn serve(stack: Stack<'static>) -> ! {
    while !stack.is_config_up() {
        Timer::after(Duration::from_millis(100)).await;
    }

    let mut rx_meta = [PacketMetadata::EMPTY; 2];
    let mut rx_buffer = [0u8; PACKET_BUF];
    let mut tx_meta = [PacketMetadata::EMPTY; 2];
    let mut tx_buffer = [0u8; PACKET_BUF];
    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );

    if let Err(e) = socket.bind(67) {
        error!("DHCP: bind failed: {:?}", e);
        loop {
            Timer::after(Duration::from_secs(3600)).await;
        }
    }
    info!("DHCP server running on port 67");

    let mut gateway = [Ipv4Addr::UNSPECIFIED; 1];
    let options = ServerOptions::new(AP_ADDRESS, Some(&mut gateway));
    let mut server = Server::<_, LEASES>::new_with_et(AP_ADDRESS);
    server.range_start = Ipv4Addr::new(192, 168, 4, 50);
    server.range_end = Ipv4Addr::new(192, 168, 4, 200);

    let mut buf = [0u8; PACKET_BUF];
    loop {
        let Ok((len, _meta)) = socket.recv_from(&mut buf).await else {
            continue;
        };

        let request = match Packet::decode(&buf[..len]) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("DHCP: decode error: {:?}", e);
                continue;
            }
        };

        let mut opt_buf = Options::buf();
        let Some(reply) = server.handle_request(&mut opt_buf, &options, &request) else {
            continue;
        };

        let mut out = [0u8; PACKET_BUF];
        match reply.encode(&mut out) {
            Ok(encoded) => {
                let broadcast = (Ipv4Address::new(255, 255, 255, 255), 68);
                if let Err(e) = socket.send_to(encoded, broadcast).await {
                    warn!("DHCP: send error: {:?}", e);
                }
            }
            Err(e) => warn!("DHCP: encode error: {:?}", e),
        }
    }
}
