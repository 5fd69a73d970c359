use clap::{Parser, ValueEnum};
use mbr_nostd::{MasterBootRecord, PartitionTable};
use pretty_hex::pretty_hex;
use sdmmc::bus::sim::{CardModel, SimBus, SimDelay, SimOptions};
use sdmmc::{BlockDevice, ChipConfig, Control, BLOCK_SIZE, SD};
use size::Size;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Model {
    SdV1,
    Sdsc,
    Sdhc,
    Mmc,
    MmcHc,
    Absent,
}

impl From<Model> for CardModel {
    fn from(model: Model) -> Self {
        match model {
            Model::SdV1 => CardModel::SdV1,
            Model::Sdsc => CardModel::SdV2 { high_capacity: false },
            Model::Sdhc => CardModel::SdV2 { high_capacity: true },
            Model::Mmc => CardModel::Mmc { high_capacity: false },
            Model::MmcHc => CardModel::Mmc { high_capacity: true },
            Model::Absent => CardModel::Absent,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Chip {
    Generic,
    Bk7256,
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Emulated card
    #[clap(short, long, value_enum, default_value = "sdhc")]
    model: Model,

    /// Card capacity in 512-byte blocks
    #[clap(short, long, default_value_t = 8192)]
    blocks: u32,

    /// Controller profile
    #[clap(short, long, value_enum, default_value = "generic")]
    chip: Chip,

    /// Blocks written and read back per transfer
    #[clap(short = 'n', long, default_value_t = 4)]
    count: u32,

    /// Increase log verbosity
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn partition_table(block: &[u8]) {
    match MasterBootRecord::from_bytes(&block) {
        Ok(mbr) => {
            for partition in mbr.partition_table_entries().iter() {
                println!("{:?}", partition);
            }
        }
        Err(e) => println!("No MBR: {:?}", e),
    }
}

fn run(args: &Args) -> Result<(), String> {
    let config = match args.chip {
        Chip::Generic => ChipConfig::generic(),
        Chip::Bk7256 => ChipConfig::bk7256(),
    };
    let sim = SimBus::new(SimOptions::new(args.model.into(), args.blocks));
    sim.fill(0);
    let mut sd = SD::new(sim.clone(), sim.clone(), SimDelay::default(), config);
    sd.open().map_err(|e| e.to_string())?;
    let capacity = sd.num_blocks() as u64 * sd.block_size() as u64;
    println!("Card: {:?}", sd.card_info());
    println!("num-blocks {} ({})", sd.num_blocks(), Size::from_bytes(capacity));
    println!("{} commands during open", sim.commands().len());

    let mut block = [0u8; BLOCK_SIZE];
    sd.read(&mut block, 0, 1).map_err(|e| e.to_string())?;
    partition_table(&block);

    let count = args.count.min(sd.num_blocks() / 2);
    let size = count as usize * BLOCK_SIZE;
    let data: Vec<u8> = (0..size).map(|i| (i * 7 + i / BLOCK_SIZE) as u8).collect();
    let mut buffer = vec![0u8; size];
    sim.clear_commands();
    for first in [0, count] {
        sd.write(&data, first, count).map_err(|e| e.to_string())?;
    }
    sd.read(&mut buffer, 0, count).map_err(|e| e.to_string())?;
    BlockDevice::control(&mut sd, Control::Sync).map_err(|e| e.to_string())?;
    if buffer != data {
        return Err("Read back mismatch".into());
    }
    println!("{}", pretty_hex(&&buffer[..64]));
    println!("Commands: {:?}", sim.commands());
    Ok(())
}

fn main() {
    let args = Args::parse();
    let level = match args.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();
    if let Err(e) = run(&args) {
        println!("{}", e)
    }
}
