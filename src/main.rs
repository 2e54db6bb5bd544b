use clap::{arg,crate_version,Command};
use adahuff::huff;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

const RCH: &str = "unreachable was reached";

fn ok_to_overwrite(path_out: &str) -> bool {
    if let Ok(_f) = std::fs::File::open(path_out) {
        let mut ans = String::new();
        eprint!("{} exists, overwrite? (y/n) ",path_out);
        if std::io::stdin().read_line(&mut ans).is_err() {
            return false;
        }
        return ans.trim_end()=="y" || ans.trim_end()=="Y";
    }
    true
}

fn main() -> STDRESULT
{
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let long_help =
"Examples:
---------
Compress:      `adahuff -i my_file -o my_file.ahf`
Expand:        `adahuff -d -i my_file.ahf -o my_file`
Trace codes:   `RUST_LOG=trace adahuff -i my_file -o my_file.ahf`";

    let main_cmd = Command::new("adahuff")
        .about("Compress and expand with one-pass adaptive Huffman coding")
        .after_long_help(long_help)
        .version(crate_version!())
        .arg(arg!(-d --decode "expand the input instead of compressing it"))
        .arg(arg!(-i --input <PATH> "input path").required(true))
        .arg(arg!(-o --output <PATH> "output path").required(true));

    let matches = main_cmd.get_matches();

    let path_in = matches.get_one::<String>("input").expect(RCH);
    let path_out = matches.get_one::<String>("output").expect(RCH);
    let decode = matches.get_flag("decode");
    if !ok_to_overwrite(path_out) {
        eprintln!("abort operation");
        return Ok(());
    }
    let mut in_file = std::fs::File::open(path_in)?;
    let mut out_file = std::fs::OpenOptions::new().write(true).truncate(false).create(true).open(path_out)?;
    if decode {
        let (in_size,out_size) = huff::expand(&mut in_file,&mut out_file,&huff::STD_OPTIONS)?;
        out_file.set_len(out_size)?;
        eprintln!("expanded {} into {}",in_size,out_size);
    } else {
        let (in_size,out_size) = huff::compress(&mut in_file,&mut out_file,&huff::STD_OPTIONS)?;
        out_file.set_len(out_size)?;
        eprintln!("compressed {} into {}",in_size,out_size);
    }
    Ok(())
}
