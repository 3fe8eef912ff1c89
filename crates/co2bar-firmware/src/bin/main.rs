#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use alloc::string::ToString;

use embassy_executor::Spawner;
use embassy_net::{Ipv4Cidr, Runner, StackResources, StaticConfigV4};
use embassy_time::{Duration, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::rtc_cntl::Rtc;
use esp_hal::timer::timg::TimerGroup;
use esp_radio::wifi::{
    AccessPointConfig, AuthMethod, ModeConfig, WifiApState, WifiController, WifiDevice, ap_state,
};
use log::{error, info, warn};
use static_cell::StaticCell;

use co2bar_core::config::PIXEL_COUNT;
use co2bar_core::light_bar::{BarStyle, LightBarManager, ModeRequest, blackout};
use co2bar_core::pipeline;
use co2bar_core::sensor_manager::{Pipeline, SensorManager};
use co2bar_core::sensors::SensorReader;
use co2bar_core::storage::{CsvLog, SharedCsvLog, run_csv_sink, run_series_task};
use co2bar_firmware::app_state::{
    AirSensor, AmbientLight, AppRunState, LedStrip, SdCardPins, SdSpiDevice, SensorI2cDevice,
    create_i2c_bus, create_led_strip, create_sd_card, init_i2c_sensors, run_state, set_run_state,
};
use co2bar_firmware::clock::DeviceClock;
use co2bar_firmware::sd_log::{FixedTimeSource, SdLogStorage};
use co2bar_firmware::{dhcp, web_server, wifi_secrets};

extern crate alloc;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

type CsvStorage = SdLogStorage<SdSpiDevice, embassy_time::Delay, FixedTimeSource>;
type DeviceSensorManager = SensorManager<
    'static,
    AirSensor<SensorI2cDevice>,
    AmbientLight<SensorI2cDevice>,
    DeviceClock,
>;

const WIFI_CHANNEL: u8 = 6;

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    // --- LED bar ---
    match create_led_strip(peripherals.SPI2, peripherals.GPIO10, peripherals.DMA_CH0) {
        Ok(strip) => spawner.must_spawn(light_bar_task(strip)),
        Err(e) => {
            error!("{}", e);
            set_run_state(AppRunState::Error);
        }
    }

    // --- Access point ---
    set_run_state(AppRunState::AccessPointStarting);
    let credentials = wifi_secrets::config().access_point;

    static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
    let radio = RADIO.init(esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller"));
    let (mut wifi_controller, interfaces) =
        esp_radio::wifi::new(radio, peripherals.WIFI, Default::default())
            .expect("Failed to initialize Wi-Fi controller");

    let mut ap_config = AccessPointConfig::default()
        .with_ssid(credentials.ssid.to_string())
        .with_channel(WIFI_CHANNEL);
    if !credentials.password.is_empty() {
        ap_config = ap_config
            .with_password(credentials.password.to_string())
            .with_auth_method(AuthMethod::Wpa2Personal);
    }
    wifi_controller
        .set_config(&ModeConfig::AccessPoint(ap_config))
        .expect("Failed to set access point config");
    wifi_controller.start().expect("Failed to start access point");
    info!("Access point '{}' starting", credentials.ssid);

    let net_config = embassy_net::Config::ipv4_static(StaticConfigV4 {
        address: Ipv4Cidr::new(dhcp::AP_ADDRESS, 24),
        gateway: Some(dhcp::AP_ADDRESS),
        dns_servers: Default::default(),
    });
    static RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
    let (stack, runner) = embassy_net::new(
        interfaces.ap,
        net_config,
        RESOURCES.init(StackResources::new()),
        0,
    );

    spawner.must_spawn(net_task(runner));
    spawner.must_spawn(wifi_keepalive(wifi_controller));
    spawner.must_spawn(dhcp_task(stack));

    // --- CSV log on the SD card ---
    let sd_pins = SdCardPins {
        sck: peripherals.GPIO12,
        mosi: peripherals.GPIO11,
        miso: peripherals.GPIO13,
        cs: peripherals.GPIO14,
    };
    static CSV_LOG: StaticCell<SharedCsvLog<CsvStorage>> = StaticCell::new();
    let csv_log = match create_sd_card(peripherals.SPI3, sd_pins) {
        Ok(card) => {
            let storage = SdLogStorage::new(card, FixedTimeSource);
            let log: &'static SharedCsvLog<CsvStorage> =
                CSV_LOG.init(SharedCsvLog::new(CsvLog::new(storage)));
            spawner.must_spawn(csv_sink_task(log));
            Some(log)
        }
        Err(e) => {
            error!("{}", e);
            pipeline::LIGHT_MODE.publish(ModeRequest::Error);
            set_run_state(AppRunState::Error);
            None
        }
    };
    // Live data and the light controls work without a card.
    spawner.must_spawn(web_server_task(stack, csv_log));

    // --- Sensors ---
    spawner.must_spawn(series_task());

    let rtc = Rtc::new(peripherals.LPWR);
    let clock = DeviceClock::new(rtc, &pipeline::NETWORK_TIME);
    match create_i2c_bus(peripherals.I2C0, peripherals.GPIO8, peripherals.GPIO9) {
        Ok(i2c) => {
            let devices = init_i2c_sensors(i2c);
            let reader = SensorReader::new(
                AirSensor::new(devices.scd41, devices.sht40),
                AmbientLight::new(devices.bh1750),
            );
            let manager = SensorManager::new(reader, clock, Pipeline::global());
            spawner.must_spawn(sensor_task(manager));
            set_run_state(AppRunState::SensorsRunning);
        }
        Err(e) => {
            error!("{}", e);
            pipeline::LIGHT_MODE.publish(ModeRequest::Error);
            set_run_state(AppRunState::Error);
        }
    }

    loop {
        Timer::after(Duration::from_secs(60)).await;
    }
}

#[embassy_executor::task]
async fn sensor_task(manager: DeviceSensorManager) {
    manager.run().await
}

#[embassy_executor::task]
async fn light_bar_task(strip: LedStrip) {
    let manager = LightBarManager::<_, PIXEL_COUNT>::new(
        strip,
        BarStyle::default(),
        &pipeline::LIGHT_TARGET,
        &pipeline::LIGHT_MODE,
    );
    let mut strip = manager.run().await;
    // Errors are logged by blackout itself.
    let _ = blackout::<_, PIXEL_COUNT>(&mut strip);

    // Off is final until reset; keep the strip so the pins stay low.
    loop {
        Timer::after(Duration::from_secs(3600)).await;
    }
}

#[embassy_executor::task]
async fn series_task() {
    run_series_task(&pipeline::SERIES_QUEUE, &pipeline::TIME_SERIES).await
}

#[embassy_executor::task]
async fn csv_sink_task(log: &'static SharedCsvLog<CsvStorage>) {
    run_csv_sink(
        log,
        &pipeline::CSV_QUEUE,
        &pipeline::CSV_CLEAR,
        &pipeline::LIGHT_MODE,
    )
    .await
}

#[embassy_executor::task]
async fn web_server_task(
    stack: embassy_net::Stack<'static>,
    log: Option<&'static SharedCsvLog<CsvStorage>>,
) {
    web_server::serve(stack, log).await
}

#[embassy_executor::task]
async fn dhcp_task(stack: embassy_net::Stack<'static>) {
    dhcp::serve(stack).await
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await;
}

/// Holds the controller (dropping it stops the radio) and logs AP state.
#[embassy_executor::task]
async fn wifi_keepalive(controller: WifiController<'static>) {
    while ap_state() != WifiApState::Started {
        Timer::after(Duration::from_millis(100)).await;
    }
    info!("Access point up on channel {}", WIFI_CHANNEL);
    if run_state() == AppRunState::AccessPointStarting {
        set_run_state(AppRunState::AccessPointUp);
    }

    let _controller = controller;
    let mut was_started = true;
    loop {
        Timer::after(Duration::from_secs(10)).await;
        let started = ap_state() == WifiApState::Started;
        if started != was_started {
            if started {
                info!("Access point restarted");
            } else {
                warn!("Access point stopped");
            }
            was_started = started;
        }
    }
}
