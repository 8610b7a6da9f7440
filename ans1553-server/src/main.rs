use std::{error::Error, net::IpAddr, sync::Arc};

use ans_server::server::Builder;
use clap::Parser;
use clap_num::maybe_hex;
use env_logger::Env;

use ans1553_server::simulated::{SimulatedBoards, handlers};

#[derive(Parser)]
#[command(about = "ANS server hosting simulated MIL-STD-1553 boards", long_about=None)]
struct Args {
    #[arg(short, long, default_value = "1553")]
    port: u16,

    #[arg(short, long, default_value = "0.0.0.0")]
    ip: IpAddr,

    #[arg(long, default_value = "11553", help = "UDP port of the startup announcement")]
    client_port: u16,

    #[arg(short, long, default_value = "1", help = "Number of simulated boards")]
    boards: u32,

    #[arg(
        short,
        long,
        default_value = "0x10000",
        value_parser = maybe_hex::<usize>,
        help = "Memory per board in bytes, decimal or 0x-prefixed hex"
    )]
    memory_size: usize,

    #[arg(short, long, default_value = "ANS1553 Server")]
    name: String,

    #[arg(long, help = "Do not answer discovery requests")]
    no_discovery: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    log::info!("Starting ANS1553 server");

    let args = Args::parse();
    log::debug!(
        "Parsed arguments: ip={}, port={}, boards={}, memory_size={:#x}",
        args.ip,
        args.port,
        args.boards,
        args.memory_size
    );

    let boards = Arc::new(SimulatedBoards::new(args.boards, args.memory_size));
    let server = Builder::new()
        .port(args.port)
        .client_port(args.client_port)
        .name(args.name)
        .description("Simulated MIL-STD-1553 boards")
        .discovery(!args.no_discovery)
        .build(handlers(boards))
        .bind(args.ip)?;
    server.context().set_board_count(args.boards);
    log::info!(
        "Serving {} boards on {}",
        args.boards,
        server.local_addr()
    );
    server.run()?;
    Ok(())
}
