use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use skyseek_core::{AppError, Config, TemperatureUnit};
use skyseek_geo::{GeoDbClient, GeoError};
use skyseek_search::{Candidate, SearchOrchestrator, SearchSnapshot, SearchStatus};
use skyseek_weather::{CurrentWeather, OpenWeatherClient, WeatherApi, WeatherError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

const HELP: &str = "Type a place name to search.
  :pick N   show weather for suggestion N
  :clear    clear the current search
  :log      show the search log
  :quit     exit";

enum Flow {
    Continue,
    Quit,
}

struct Session {
    search: SearchOrchestrator,
    geo: Arc<GeoDbClient>,
    weather: Arc<OpenWeatherClient>,
}

#[tokio::main]
async fn main() -> Result<()> {
    skyseek_core::init()?;

    let session = match Session::start() {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("Startup failed: {}", e);
            eprintln!("{}", e.user_message());
            return Err(e.into());
        }
    };

    tracing::info!("SkySeek started");
    println!("SkySeek - weather lookup");
    println!("{}", HELP);
    prompt()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        if let Flow::Quit = session.handle(line.trim()).await {
            break;
        }
        if let Err(e) = prompt() {
            tracing::error!("Terminal write failed: {}", e);
            println!("{}", e.user_message());
            break;
        }
    }

    session.search.shutdown().await;
    tracing::info!("SkySeek stopped");
    Ok(())
}

fn prompt() -> Result<(), AppError> {
    print!("> ");
    std::io::stdout().flush()?;
    Ok(())
}

impl Session {
    fn start() -> Result<Self, AppError> {
        let (config, _) = Config::load_validated().map_err(AppError::from_config_load)?;
        let geo = GeoDbClient::new(config.geo.clone()).map_err(|e| match e {
            GeoError::Network(e) => AppError::Network(e),
            other => AppError::Other(other.into()),
        })?;
        let weather = OpenWeatherClient::new(config.weather.clone()).map_err(|e| match e {
            WeatherError::Network(e) => AppError::Network(e),
            other => AppError::Other(other.into()),
        })?;

        let geo = Arc::new(geo);
        let weather = Arc::new(weather);
        let search = SearchOrchestrator::new(geo.clone(), weather.clone(), &config);
        Ok(Self {
            search,
            geo,
            weather,
        })
    }

    async fn handle(&self, line: &str) -> Flow {
        match line.split_once(' ').map_or((line, ""), |(c, rest)| (c, rest.trim())) {
            ("", _) => {}
            (":quit" | ":q", _) => return Flow::Quit,
            (":help", _) => println!("{}", HELP),
            (":clear", _) => {
                self.search.clear_search();
                println!("Cleared.");
            }
            (":log", _) => {
                for entry in self.search.log() {
                    println!("{}", entry);
                }
                let cooldown = self.geo.cooldown_remaining();
                if !cooldown.is_zero() {
                    println!("Geo lookups paused for {:.1}s", cooldown.as_secs_f64());
                }
            }
            (":pick", arg) => match arg.parse::<usize>().ok().and_then(|n| n.checked_sub(1)) {
                Some(index) => self.pick(index).await,
                None => println!("Usage: :pick N (N as listed)"),
            },
            (cmd, _) if cmd.starts_with(':') => println!("Unknown command. Try :help"),
            _ => {
                self.search.perform_search(line);
                let snapshot = self.search.settled().await;
                print_snapshot(&snapshot);
            }
        }
        Flow::Continue
    }

    async fn pick(&self, index: usize) {
        let snapshot = self.search.snapshot();
        let Some(candidate) = snapshot.suggestions.get(index) else {
            println!("No suggestion #{}.", index + 1);
            return;
        };

        if !self.search.validate_and_select(candidate).await {
            println!("No weather data for {}.", candidate.display_name);
            return;
        }

        let cancel = CancellationToken::new();
        match self.current(candidate, &cancel).await {
            Ok(current) => {
                print_current(&current, self.weather.temperature_unit());
                match self.weather.forecast_by_coords(current.coordinates, &cancel).await {
                    Ok(forecast) => {
                        for day in forecast.daily() {
                            println!(
                                "  {}  {:>5.1} / {:>5.1}  {:<14} {:>3}%",
                                day.date.format("%a %d %b"),
                                day.high,
                                day.low,
                                day.condition.description(),
                                day.precipitation_chance
                            );
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Forecast for {} failed: {}", candidate.display_name, e);
                        println!("{}", e.user_message());
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Weather for {} failed: {}", candidate.display_name, e);
                println!("{}", e.user_message());
            }
        }
    }

    async fn current(
        &self,
        candidate: &Candidate,
        cancel: &CancellationToken,
    ) -> Result<CurrentWeather, WeatherError> {
        let observation = match candidate.coordinates {
            Some(coords) => self.weather.current_by_coords(coords, cancel).await?,
            None => self.weather.current_by_name(candidate.lookup_name(), cancel).await?,
        };
        CurrentWeather::try_from(observation)
    }
}

fn print_snapshot(snapshot: &SearchSnapshot) {
    match snapshot.status {
        SearchStatus::Idle => {}
        SearchStatus::Fetching => println!("Still searching..."),
        SearchStatus::NoResults => println!("No places found for \"{}\".", snapshot.query),
        SearchStatus::Error => println!(
            "{}",
            snapshot.error.as_deref().unwrap_or("Search failed.")
        ),
        SearchStatus::Success => {
            for (i, candidate) in snapshot.suggestions.iter().enumerate() {
                println!(
                    "{:>3}. [{}] {}",
                    i + 1,
                    candidate.validation_state.badge(),
                    candidate.display_name
                );
            }
        }
    }
}

fn print_current(current: &CurrentWeather, unit: TemperatureUnit) {
    let place = match &current.country {
        Some(country) => format!("{}, {}", current.location_name, country),
        None => current.location_name.clone(),
    };
    println!(
        "{}: {:.1}{} {} ({})",
        place,
        current.temperature,
        unit.symbol(),
        current.condition.description(),
        current.description
    );
    if let Some(feels_like) = current.feels_like {
        println!("  feels like {:.1}{}", feels_like, unit.symbol());
    }
    if let Some(humidity) = current.humidity {
        println!("  humidity {}%", humidity);
    }
    if let Some(wind) = current.wind_speed {
        println!("  wind {:.1}", wind);
    }
}
