use std::net::SocketAddr;

use katcp::Client;

fn main() -> anyhow::Result<()> {
    // Connect to the SNAP
    let host_addr: SocketAddr = "10.10.10.101:7147".parse()?;
    let mut client = Client::connect(host_addr)?;
    // Make sure someone is home
    client.watchdog()?;
    dbg!(client.listbof()?);
    if client.status()? {
        dbg!(client.listdev()?);
    }
    Ok(())
}
