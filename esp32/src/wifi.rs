use anyhow::anyhow;
use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
use log::info;
use motion_sensor_common::config::WifiConfig;
use motion_sensor_common::Network;

type Wifi = BlockingWifi<EspWifi<'static>>;

/// Station mode Wi-Fi, associated on demand by the boot cycle.
pub struct WifiLink {
    wifi: Wifi,
    configuration: Configuration,
    started: bool,
}

impl WifiLink {
    pub fn new(wifi: Wifi, config: &WifiConfig) -> anyhow::Result<Self> {
        let auth_method = if config.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        let configuration = Configuration::Client(ClientConfiguration {
            ssid: config
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("wifi ssid too long"))?,
            bssid: None,
            auth_method,
            password: config
                .password
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("wifi password too long"))?,
            channel: None,
            ..Default::default()
        });

        Ok(Self {
            wifi,
            configuration,
            started: false,
        })
    }

    fn start(&mut self) -> anyhow::Result<()> {
        self.wifi.set_configuration(&self.configuration)?;

        self.wifi.start()?;
        info!("Wifi started");

        self.started = true;
        Ok(())
    }
}

impl Network for WifiLink {
    type Error = anyhow::Error;

    fn associate(&mut self) -> anyhow::Result<()> {
        if !self.started {
            self.start()?;
        }

        if let Err(err) = self.wifi.connect() {
            let _ = self.wifi.disconnect();
            return Err(err.into());
        }
        info!("Wifi connected");

        if let Err(err) = self.wifi.wait_netif_up() {
            let _ = self.wifi.disconnect();
            return Err(err.into());
        }
        info!("Wifi netif up");

        let ip_info = self.wifi.wifi().sta_netif().get_ip_info()?;
        info!("Wifi DHCP info: {:?}", ip_info);

        Ok(())
    }
}
