use isdbt_core::tuner::PlatformBackend;
use isdbt_core::{enumerate_adapters, format_adapter_list, AdapterInfo};
use log::info;

use super::CommandResult;

pub(crate) fn run() -> CommandResult {
    let adapters = enumerate_adapters(&PlatformBackend::default())?;
    info!("Devices information: {} adapter(s)", adapters.len());
    for line in render(&adapters) {
        println!("{}", line);
    }
    Ok(())
}

/// One `"<N>: <name>\t<root>"` line per adapter.
fn render(adapters: &[AdapterInfo]) -> Vec<String> {
    adapters
        .iter()
        .map(|a| format_adapter_list(std::slice::from_ref(a)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_render() {
        let adapters = vec![
            AdapterInfo {
                index: 0,
                name: "Siano Mobile Digital MDTV Receiver".to_string(),
                root: PathBuf::from("/dev/dvb/adapter0"),
            },
            AdapterInfo {
                index: 1,
                name: "MB86A20S".to_string(),
                root: PathBuf::from("/dev/dvb/adapter1"),
            },
        ];
        assert_eq!(
            render(&adapters),
            vec![
                "0: Siano Mobile Digital MDTV Receiver\t/dev/dvb/adapter0".to_string(),
                "1: MB86A20S\t/dev/dvb/adapter1".to_string(),
            ]
        );
    }
}
