use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use modbus_rtu_client::{probe, Client, ClientConfig, DeviceSnapshot};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Path to the config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dump default config and exit
    #[arg(long = "dump-default-config")]
    dump_default: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Sweep ports, baud rates and unit IDs for a responsive device
    Probe {
        /// Ports to scan; platform enumeration when omitted
        ports: Vec<String>,
    },
    /// Perform one read and print the values
    Read {
        #[arg(value_enum)]
        table: Table,

        /// First address to read
        address: u16,

        /// Number of points
        #[arg(default_value_t = 1)]
        quantity: u16,

        /// Unit ID; the configured default when omitted
        #[arg(short, long)]
        unit: Option<u8>,
    },
    /// Read a window of all four tables and dump the device snapshot
    Snapshot {
        /// Unit ID; the configured default when omitted
        #[arg(short, long)]
        unit: Option<u8>,

        /// First address of the scanned window
        #[arg(long, default_value_t = 0)]
        address: u16,

        /// Points per table
        #[arg(long, default_value_t = 8)]
        count: u16,
    },
}

#[derive(Copy, Clone, ValueEnum)]
enum Table {
    Coils,
    Discrete,
    Holding,
    Input,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.dump_default {
        let config = ClientConfig::default();
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => ClientConfig::from_file(path.clone())?,
        None => ClientConfig::load()?,
    };

    modbus_rtu_client::setup_logging(&config.logging)?;

    match cli.command {
        Some(Command::Probe { ports }) => {
            let ports = if ports.is_empty() {
                probe::available_ports()
            } else {
                ports
            };

            match probe::detect(
                &ports,
                &probe::DEFAULT_BAUD_SCAN,
                &probe::DEFAULT_UNIT_SCAN,
                &config,
            )
            .await
            {
                Some(found) => println!("{}", serde_json::to_string_pretty(&found)?),
                None => {
                    eprintln!("No responsive device found");
                    std::process::exit(1);
                }
            }
        }

        Some(Command::Read {
            table,
            address,
            quantity,
            unit,
        }) => {
            Client::scoped(config, |client| async move {
                match table {
                    Table::Coils => {
                        let values = client.read_coils(unit, address, quantity).await?;
                        print_bits(address, &values);
                    }
                    Table::Discrete => {
                        let values = client.read_discrete_inputs(unit, address, quantity).await?;
                        print_bits(address, &values);
                    }
                    Table::Holding => {
                        let values = client.read_holding_registers(unit, address, quantity).await?;
                        print_registers(address, &values);
                    }
                    Table::Input => {
                        let values = client.read_input_registers(unit, address, quantity).await?;
                        print_registers(address, &values);
                    }
                }
                Ok(())
            })
            .await?;
        }

        Some(Command::Snapshot {
            unit,
            address,
            count,
        }) => {
            let snapshots: Vec<DeviceSnapshot> = Client::scoped(config, |client| async move {
                // Best effort per table; devices rarely populate all four.
                let _ = client.read_coils(unit, address, count).await;
                let _ = client.read_discrete_inputs(unit, address, count).await;
                let _ = client.read_holding_registers(unit, address, count).await;
                let _ = client.read_input_registers(unit, address, count).await;

                Ok(client
                    .tracker()
                    .map(|tracker| tracker.snapshot_all())
                    .unwrap_or_default())
            })
            .await?;

            println!("{}", serde_json::to_string_pretty(&snapshots)?);
        }

        None => {
            eprintln!("No command given, try --help");
            std::process::exit(2);
        }
    }

    Ok(())
}

fn print_bits(address: u16, values: &[bool]) {
    for (offset, value) in values.iter().enumerate() {
        println!("{}: {}", address + offset as u16, if *value { "ON" } else { "OFF" });
    }
}

fn print_registers(address: u16, values: &[u16]) {
    for (offset, value) in values.iter().enumerate() {
        println!("{}: {} (0x{:04X})", address + offset as u16, value, value);
    }
}
